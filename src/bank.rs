//! Model Banks
//!
//! Named collections of heterogeneous learners with a trained/untrained flag.
//! Training fits every learner independently (in parallel), computes
//! train/validation metrics plus 5-fold cross-validation on the training
//! rows, and records a failed learner as `None` without aborting the others.
//! Banks are read-only after training; inference never mutates them.

use crate::learners::{CropLearner, YieldLearner};
use crate::utils::{
    accuracy, kfold_indices, mae, mean, r2_score, rmse, std_dev, take_labels, take_rows,
    take_values,
};
use anyhow::{anyhow, bail, Result};
use ndarray::{ArrayView1, ArrayView2};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

const CV_FOLDS: usize = 5;
const CV_SEED: u64 = 42;

/// Per-learner regression metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub train_r2: f64,
    pub train_rmse: f64,
    pub train_mae: f64,
    pub val_r2: Option<f64>,
    pub val_rmse: Option<f64>,
    pub val_mae: Option<f64>,
    pub cv_mean: f64,
    pub cv_std: f64,
}

/// Per-learner classification metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub train_accuracy: f64,
    pub val_accuracy: Option<f64>,
    pub cv_mean: f64,
    pub cv_std: f64,
}

/// Regression bank for yield prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YieldModelBank {
    learners: Vec<(String, YieldLearner)>,
    /// Names whose fit failed during the last training run; excluded from
    /// prediction and ensemble membership
    failed: Vec<String>,
    pub is_trained: bool,
}

impl YieldModelBank {
    pub fn new(learners: Vec<(String, YieldLearner)>) -> Self {
        YieldModelBank {
            learners,
            failed: Vec::new(),
            is_trained: false,
        }
    }

    pub fn with_default_learners() -> Self {
        Self::new(crate::learners::default_yield_learners())
    }

    pub fn learner_names(&self) -> Vec<&str> {
        self.learners.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&YieldLearner> {
        self.learners
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, l)| l)
    }

    /// Swap in a replacement learner (the tuner's best configuration)
    pub fn replace(&mut self, name: &str, learner: YieldLearner) -> Result<()> {
        match self.learners.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => {
                slot.1 = learner;
                Ok(())
            }
            None => bail!("No learner named '{}' in the bank", name),
        }
    }

    fn is_failed(&self, name: &str) -> bool {
        self.failed.iter().any(|f| f == name)
    }

    /// Fit every learner and score it. One learner's failure never aborts the
    /// others; it is logged, recorded as `None`, and excluded downstream.
    pub fn train(
        &mut self,
        x_train: ArrayView2<f64>,
        y_train: ArrayView1<f64>,
        x_val: Option<ArrayView2<f64>>,
        y_val: Option<ArrayView1<f64>>,
    ) -> FxHashMap<String, Option<RegressionMetrics>> {
        let results: Vec<(String, Result<RegressionMetrics>)> = self
            .learners
            .par_iter_mut()
            .map(|(name, learner)| {
                let outcome = train_one_regressor(learner, x_train, y_train, x_val, y_val);
                (name.clone(), outcome)
            })
            .collect();

        // Single-writer merge of the parallel results
        let mut scores = FxHashMap::default();
        self.failed.clear();
        for (name, outcome) in results {
            match outcome {
                Ok(metrics) => {
                    tracing::info!(
                        learner = name.as_str(),
                        train_r2 = metrics.train_r2,
                        cv_mean = metrics.cv_mean,
                        cv_std = metrics.cv_std,
                        "trained yield learner"
                    );
                    scores.insert(name, Some(metrics));
                }
                Err(err) => {
                    tracing::warn!(learner = name.as_str(), error = %err, "yield learner failed to train");
                    self.failed.push(name.clone());
                    scores.insert(name, None);
                }
            }
        }
        self.is_trained = true;
        scores
    }

    /// Point estimates from every successfully trained learner
    pub fn predict_each(&self, features: &[f64]) -> Vec<(String, f64)> {
        self.learners
            .iter()
            .filter(|(name, _)| !self.is_failed(name))
            .filter_map(|(name, learner)| {
                learner.predict(features).ok().map(|p| (name.clone(), p))
            })
            .collect()
    }

    /// Averaged normalized importance across learners that expose it
    pub fn feature_importance(&self, feature_names: &[String]) -> FxHashMap<String, f64> {
        let tables: Vec<Vec<f64>> = self
            .learners
            .iter()
            .filter(|(name, _)| !self.is_failed(name))
            .filter_map(|(_, learner)| learner.feature_importance())
            .collect();

        let mut averaged = FxHashMap::default();
        if tables.is_empty() {
            return averaged;
        }
        for (i, name) in feature_names.iter().enumerate() {
            let values: Vec<f64> = tables.iter().map(|t| t[i]).collect();
            averaged.insert(name.clone(), mean(&values));
        }
        averaged
    }
}

fn train_one_regressor(
    learner: &mut YieldLearner,
    x_train: ArrayView2<f64>,
    y_train: ArrayView1<f64>,
    x_val: Option<ArrayView2<f64>>,
    y_val: Option<ArrayView1<f64>>,
) -> Result<RegressionMetrics> {
    learner.fit(x_train, y_train)?;

    let train_pred = learner.predict_batch(x_train)?;
    let actual: Vec<f64> = y_train.to_vec();
    let train_r2 = r2_score(&actual, &train_pred);
    let train_rmse = rmse(&actual, &train_pred);
    let train_mae = mae(&actual, &train_pred);

    let (val_r2, val_rmse, val_mae) = match (x_val, y_val) {
        (Some(xv), Some(yv)) => {
            let val_pred = learner.predict_batch(xv)?;
            let val_actual: Vec<f64> = yv.to_vec();
            (
                Some(r2_score(&val_actual, &val_pred)),
                Some(rmse(&val_actual, &val_pred)),
                Some(mae(&val_actual, &val_pred)),
            )
        }
        _ => (None, None, None),
    };

    let cv_scores = cross_validate_regressor(learner, x_train, y_train, CV_FOLDS)?;
    Ok(RegressionMetrics {
        train_r2,
        train_rmse,
        train_mae,
        val_r2,
        val_rmse,
        val_mae,
        cv_mean: mean(&cv_scores),
        cv_std: std_dev(&cv_scores),
    })
}

/// k-fold R² scores for a fresh copy of the learner's configuration
pub fn cross_validate_regressor(
    learner: &YieldLearner,
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    k: usize,
) -> Result<Vec<f64>> {
    let folds = kfold_indices(x.nrows(), k, CV_SEED);
    let mut scores = Vec::with_capacity(folds.len());
    for (train_idx, val_idx) in folds {
        let x_fold = take_rows(x, &train_idx);
        let y_fold = take_values(y, &train_idx);
        let mut candidate = learner.fresh();
        candidate.fit(x_fold.view(), y_fold.view())?;

        let x_hold = take_rows(x, &val_idx);
        let predicted = candidate.predict_batch(x_hold.view())?;
        let actual: Vec<f64> = val_idx.iter().map(|&i| y[i]).collect();
        scores.push(r2_score(&actual, &predicted));
    }
    Ok(scores)
}

/// Classification bank for crop recommendation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropModelBank {
    learners: Vec<(String, CropLearner)>,
    classes: Vec<String>,
    failed: Vec<String>,
    pub is_trained: bool,
}

impl CropModelBank {
    pub fn new(learners: Vec<(String, CropLearner)>) -> Self {
        CropModelBank {
            learners,
            classes: Vec::new(),
            failed: Vec::new(),
            is_trained: false,
        }
    }

    pub fn with_default_learners() -> Self {
        Self::new(crate::learners::default_crop_learners())
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn learner_names(&self) -> Vec<&str> {
        self.learners.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn replace(&mut self, name: &str, learner: CropLearner) -> Result<()> {
        match self.learners.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => {
                slot.1 = learner;
                Ok(())
            }
            None => bail!("No learner named '{}' in the bank", name),
        }
    }

    fn is_failed(&self, name: &str) -> bool {
        self.failed.iter().any(|f| f == name)
    }

    /// Map string labels onto stable class indices (sorted label order)
    pub fn encode_labels(labels: &[String]) -> (Vec<String>, Vec<usize>) {
        let mut classes: Vec<String> = labels.to_vec();
        classes.sort();
        classes.dedup();
        let encoded = labels
            .iter()
            .map(|l| classes.iter().position(|c| c == l).unwrap_or(0))
            .collect();
        (classes, encoded)
    }

    pub fn train(
        &mut self,
        x_train: ArrayView2<f64>,
        labels_train: &[String],
        x_val: Option<ArrayView2<f64>>,
        labels_val: Option<&[String]>,
    ) -> FxHashMap<String, Option<ClassificationMetrics>> {
        let (classes, y_train) = Self::encode_labels(labels_train);
        let n_classes = classes.len();
        let y_val: Option<Vec<usize>> = labels_val.map(|labels| {
            labels
                .iter()
                .map(|l| classes.iter().position(|c| c == l).unwrap_or(0))
                .collect()
        });

        let results: Vec<(String, Result<ClassificationMetrics>)> = self
            .learners
            .par_iter_mut()
            .map(|(name, learner)| {
                let outcome = train_one_classifier(
                    learner,
                    x_train,
                    &y_train,
                    n_classes,
                    x_val,
                    y_val.as_deref(),
                );
                (name.clone(), outcome)
            })
            .collect();

        let mut scores = FxHashMap::default();
        self.failed.clear();
        for (name, outcome) in results {
            match outcome {
                Ok(metrics) => {
                    tracing::info!(
                        learner = name.as_str(),
                        train_accuracy = metrics.train_accuracy,
                        cv_mean = metrics.cv_mean,
                        "trained crop learner"
                    );
                    scores.insert(name, Some(metrics));
                }
                Err(err) => {
                    tracing::warn!(learner = name.as_str(), error = %err, "crop learner failed to train");
                    self.failed.push(name.clone());
                    scores.insert(name, None);
                }
            }
        }
        self.classes = classes;
        self.is_trained = true;
        scores
    }

    /// Class probabilities averaged over every successfully trained learner
    /// that exposes them. Fails only when no learner can contribute.
    pub fn average_probabilities(&self, features: &[f64]) -> Result<Vec<f64>> {
        let tables: Vec<Vec<f64>> = self
            .learners
            .iter()
            .filter(|(name, _)| !self.is_failed(name))
            .filter_map(|(_, learner)| learner.predict_proba(features).ok())
            .collect();
        if tables.is_empty() {
            return Err(anyhow!("No classifier produced probabilities"));
        }
        let n_classes = self.classes.len();
        let mut averaged = vec![0.0; n_classes];
        for table in &tables {
            for (i, p) in table.iter().enumerate() {
                averaged[i] += p;
            }
        }
        let k = tables.len() as f64;
        for p in averaged.iter_mut() {
            *p /= k;
        }
        Ok(averaged)
    }

    pub fn feature_importance(&self, feature_names: &[String]) -> FxHashMap<String, f64> {
        let tables: Vec<Vec<f64>> = self
            .learners
            .iter()
            .filter(|(name, _)| !self.is_failed(name))
            .filter_map(|(_, learner)| learner.feature_importance())
            .collect();

        let mut averaged = FxHashMap::default();
        if tables.is_empty() {
            return averaged;
        }
        for (i, name) in feature_names.iter().enumerate() {
            let values: Vec<f64> = tables.iter().map(|t| t[i]).collect();
            averaged.insert(name.clone(), mean(&values));
        }
        averaged
    }
}

fn train_one_classifier(
    learner: &mut CropLearner,
    x_train: ArrayView2<f64>,
    y_train: &[usize],
    n_classes: usize,
    x_val: Option<ArrayView2<f64>>,
    y_val: Option<&[usize]>,
) -> Result<ClassificationMetrics> {
    learner.fit(x_train, y_train, n_classes)?;

    let train_pred: Vec<usize> = (0..x_train.nrows())
        .map(|i| learner.predict_class(&x_train.row(i).to_vec()))
        .collect::<Result<_>>()?;
    let train_accuracy = accuracy(y_train, &train_pred);

    let val_accuracy = match (x_val, y_val) {
        (Some(xv), Some(yv)) => {
            let val_pred: Vec<usize> = (0..xv.nrows())
                .map(|i| learner.predict_class(&xv.row(i).to_vec()))
                .collect::<Result<_>>()?;
            Some(accuracy(yv, &val_pred))
        }
        _ => None,
    };

    let cv_scores = cross_validate_classifier(learner, x_train, y_train, n_classes, CV_FOLDS)?;
    Ok(ClassificationMetrics {
        train_accuracy,
        val_accuracy,
        cv_mean: mean(&cv_scores),
        cv_std: std_dev(&cv_scores),
    })
}

/// k-fold accuracy scores for a fresh copy of the learner's configuration
pub fn cross_validate_classifier(
    learner: &CropLearner,
    x: ArrayView2<f64>,
    y: &[usize],
    n_classes: usize,
    k: usize,
) -> Result<Vec<f64>> {
    let folds = kfold_indices(x.nrows(), k, CV_SEED);
    let mut scores = Vec::with_capacity(folds.len());
    for (train_idx, val_idx) in folds {
        let x_fold = take_rows(x, &train_idx);
        let y_fold = take_labels(y, &train_idx);
        let mut candidate = learner.fresh();
        candidate.fit(x_fold.view(), &y_fold, n_classes)?;

        let predicted: Vec<usize> = val_idx
            .iter()
            .map(|&i| candidate.predict_class(&x.row(i).to_vec()))
            .collect::<Result<_>>()?;
        let actual = take_labels(y, &val_idx);
        scores.push(accuracy(&actual, &predicted));
    }
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learners::{
        LinearRegression, RandomForestRegressor, TreeConfig, YieldLearner,
    };
    use ndarray::{Array1, Array2};

    fn linear_dataset(n: usize) -> (Array2<f64>, Array1<f64>) {
        let mut x = Array2::zeros((n, 2));
        let mut y = Array1::zeros(n);
        for i in 0..n {
            x[[i, 0]] = i as f64;
            x[[i, 1]] = (i % 5) as f64;
            y[i] = 1.5 * i as f64 + 0.5 * (i % 5) as f64 + 2.0;
        }
        (x, y)
    }

    #[test]
    fn test_failed_learner_does_not_abort_training() {
        let (x, y) = linear_dataset(30);
        let mut bank = YieldModelBank::new(vec![
            (
                "linear_regression".to_string(),
                YieldLearner::Linear(LinearRegression::new()),
            ),
            (
                // Zero trees always fails fit
                "broken_forest".to_string(),
                YieldLearner::RandomForest(RandomForestRegressor::new(
                    0,
                    TreeConfig::default(),
                    42,
                )),
            ),
        ]);
        let scores = bank.train(x.view(), y.view(), None, None);

        assert!(scores["linear_regression"].is_some());
        assert!(scores["broken_forest"].is_none());
        assert!(bank.is_trained);

        // The failed learner contributes no predictions
        let preds = bank.predict_each(&[3.0, 1.0]);
        assert_eq!(preds.len(), 1);
        assert_eq!(preds[0].0, "linear_regression");
    }

    #[test]
    fn test_training_metrics_reported() {
        let (x, y) = linear_dataset(40);
        let (train, test): (Vec<usize>, Vec<usize>) = ((0..30).collect(), (30..40).collect());
        let x_train = take_rows(x.view(), &train);
        let y_train = take_values(y.view(), &train);
        let x_val = take_rows(x.view(), &test);
        let y_val = take_values(y.view(), &test);

        let mut bank = YieldModelBank::new(vec![(
            "linear_regression".to_string(),
            YieldLearner::Linear(LinearRegression::new()),
        )]);
        let scores = bank.train(
            x_train.view(),
            y_train.view(),
            Some(x_val.view()),
            Some(y_val.view()),
        );
        let metrics = scores["linear_regression"].as_ref().unwrap();
        assert!(metrics.train_r2 > 0.99);
        assert!(metrics.val_r2.unwrap() > 0.99);
        assert!(metrics.train_rmse >= 0.0);
        assert!(metrics.train_mae >= 0.0);
        assert!(metrics.cv_mean > 0.9);
    }

    #[test]
    fn test_crop_bank_trains_and_averages_probabilities() {
        let mut x = Array2::zeros((30, 1));
        let mut labels = Vec::new();
        for i in 0..30 {
            x[[i, 0]] = i as f64;
            labels.push(if i < 15 { "Rice".to_string() } else { "Wheat".to_string() });
        }
        let mut bank = CropModelBank::with_default_learners();
        let scores = bank.train(x.view(), &labels, None, None);
        assert!(scores.values().any(|m| m.is_some()));
        assert_eq!(bank.classes(), &["Rice".to_string(), "Wheat".to_string()]);

        let probs = bank.average_probabilities(&[2.0]).unwrap();
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(probs[0] > probs[1]); // low x is Rice territory
    }
}
