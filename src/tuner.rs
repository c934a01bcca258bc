//! Hyperparameter Tuning
//!
//! Grid search with 3-fold cross-validation over declared parameter grids.
//! Grid points evaluate in parallel; the winning configuration is refit on
//! the full training rows and swapped into the bank. Any per-learner failure
//! is non-fatal and leaves the prior (un-tuned) instance intact.

use crate::bank::{
    cross_validate_classifier, cross_validate_regressor, CropModelBank, YieldModelBank,
};
use crate::learners::{
    CropLearner, GradientBoostingRegressor, KnnClassifier, KnnRegressor,
    RandomForestClassifier, RandomForestRegressor, RidgeRegression, TreeConfig, YieldLearner,
};
use crate::utils::mean;
use ndarray::{ArrayView1, ArrayView2};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

const TUNE_FOLDS: usize = 3;
const FOREST_SEED: u64 = 42;

/// Winning grid point for one learner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunedConfig {
    pub params: FxHashMap<String, f64>,
    pub score: f64,
}

fn params(entries: &[(&str, f64)]) -> FxHashMap<String, f64> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect()
}

/// Declared grid per tunable yield learner
fn yield_grid(name: &str) -> Vec<(FxHashMap<String, f64>, YieldLearner)> {
    match name {
        "random_forest" => {
            let mut grid = Vec::new();
            for &n_trees in &[50usize, 100, 200] {
                for &max_depth in &[5usize, 10, 15] {
                    for &min_samples_split in &[2usize, 5, 10] {
                        let config = TreeConfig {
                            max_depth,
                            min_samples_split,
                            min_samples_leaf: 2,
                        };
                        grid.push((
                            params(&[
                                ("n_trees", n_trees as f64),
                                ("max_depth", max_depth as f64),
                                ("min_samples_split", min_samples_split as f64),
                            ]),
                            YieldLearner::RandomForest(RandomForestRegressor::new(
                                n_trees,
                                config,
                                FOREST_SEED,
                            )),
                        ));
                    }
                }
            }
            grid
        }
        "gradient_boosting" => {
            let mut grid = Vec::new();
            for &n_estimators in &[50usize, 100, 200] {
                for &learning_rate in &[0.05, 0.1, 0.2] {
                    for &max_depth in &[3usize, 6, 9] {
                        let config = TreeConfig {
                            max_depth,
                            min_samples_split: 2,
                            min_samples_leaf: 1,
                        };
                        grid.push((
                            params(&[
                                ("n_estimators", n_estimators as f64),
                                ("learning_rate", learning_rate),
                                ("max_depth", max_depth as f64),
                            ]),
                            YieldLearner::GradientBoosting(GradientBoostingRegressor::new(
                                n_estimators,
                                learning_rate,
                                config,
                            )),
                        ));
                    }
                }
            }
            grid
        }
        "knn" => [3usize, 5, 7, 9]
            .iter()
            .map(|&k| {
                (
                    params(&[("k", k as f64)]),
                    YieldLearner::Knn(KnnRegressor::new(k)),
                )
            })
            .collect(),
        "ridge" => [0.1, 1.0, 10.0]
            .iter()
            .map(|&alpha| {
                (
                    params(&[("alpha", alpha)]),
                    YieldLearner::Ridge(RidgeRegression::new(alpha)),
                )
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Declared grid per tunable crop learner
fn crop_grid(name: &str) -> Vec<(FxHashMap<String, f64>, CropLearner)> {
    match name {
        "random_forest" => {
            let mut grid = Vec::new();
            for &n_trees in &[50usize, 100, 200] {
                for &max_depth in &[5usize, 10, 15] {
                    for &min_samples_split in &[2usize, 5, 10] {
                        let config = TreeConfig {
                            max_depth,
                            min_samples_split,
                            min_samples_leaf: 2,
                        };
                        grid.push((
                            params(&[
                                ("n_trees", n_trees as f64),
                                ("max_depth", max_depth as f64),
                                ("min_samples_split", min_samples_split as f64),
                            ]),
                            CropLearner::RandomForest(RandomForestClassifier::new(
                                n_trees,
                                config,
                                FOREST_SEED,
                            )),
                        ));
                    }
                }
            }
            grid
        }
        "knn" => [3usize, 5, 7, 9]
            .iter()
            .map(|&k| {
                (
                    params(&[("k", k as f64)]),
                    CropLearner::Knn(KnnClassifier::new(k)),
                )
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Grid-search the tunable yield learners, replacing each with its best
/// configuration refit on the full training rows
pub fn tune_yield_bank(
    bank: &mut YieldModelBank,
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
) -> FxHashMap<String, Option<TunedConfig>> {
    let mut outcomes = FxHashMap::default();
    let tunable: Vec<String> = bank
        .learner_names()
        .into_iter()
        .map(str::to_string)
        .filter(|n| !yield_grid(n).is_empty())
        .collect();

    for name in tunable {
        let grid = yield_grid(&name);
        let scored: Vec<(usize, f64)> = grid
            .par_iter()
            .enumerate()
            .filter_map(|(i, (_, candidate))| {
                cross_validate_regressor(candidate, x, y, TUNE_FOLDS)
                    .ok()
                    .map(|scores| (i, mean(&scores)))
            })
            .collect();

        let best = scored
            .into_iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let outcome = match best {
            Some((i, score)) => {
                let (best_params, learner) = &grid[i];
                let mut refit = learner.fresh();
                match refit.fit(x, y) {
                    Ok(()) => {
                        if bank.replace(&name, refit).is_ok() {
                            tracing::info!(learner = name.as_str(), score, "tuned yield learner");
                            Some(TunedConfig {
                                params: best_params.clone(),
                                score,
                            })
                        } else {
                            None
                        }
                    }
                    Err(err) => {
                        tracing::warn!(learner = name.as_str(), error = %err, "refit of best configuration failed");
                        None
                    }
                }
            }
            None => {
                tracing::warn!(learner = name.as_str(), "grid search produced no viable configuration");
                None
            }
        };
        outcomes.insert(name, outcome);
    }
    outcomes
}

/// Grid-search the tunable crop learners
pub fn tune_crop_bank(
    bank: &mut CropModelBank,
    x: ArrayView2<f64>,
    labels: &[String],
) -> FxHashMap<String, Option<TunedConfig>> {
    let (classes, y) = CropModelBank::encode_labels(labels);
    let n_classes = classes.len();

    let mut outcomes = FxHashMap::default();
    let tunable: Vec<String> = bank
        .learner_names()
        .into_iter()
        .map(str::to_string)
        .filter(|n| !crop_grid(n).is_empty())
        .collect();

    for name in tunable {
        let grid = crop_grid(&name);
        let scored: Vec<(usize, f64)> = grid
            .par_iter()
            .enumerate()
            .filter_map(|(i, (_, candidate))| {
                cross_validate_classifier(candidate, x, &y, n_classes, TUNE_FOLDS)
                    .ok()
                    .map(|scores| (i, mean(&scores)))
            })
            .collect();

        let best = scored
            .into_iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let outcome = match best {
            Some((i, score)) => {
                let (best_params, learner) = &grid[i];
                let mut refit = learner.fresh();
                match refit.fit(x, &y, n_classes) {
                    Ok(()) => {
                        if bank.replace(&name, refit).is_ok() {
                            tracing::info!(learner = name.as_str(), score, "tuned crop learner");
                            Some(TunedConfig {
                                params: best_params.clone(),
                                score,
                            })
                        } else {
                            None
                        }
                    }
                    Err(err) => {
                        tracing::warn!(learner = name.as_str(), error = %err, "refit of best configuration failed");
                        None
                    }
                }
            }
            None => {
                tracing::warn!(learner = name.as_str(), "grid search produced no viable configuration");
                None
            }
        };
        outcomes.insert(name, outcome);
    }
    outcomes
}
