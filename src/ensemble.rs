//! Ensemble Aggregation
//!
//! Combines per-learner yield estimates into one calibrated prediction.
//! Weights derive from validation R²: learners scoring ≤ 0 are excluded
//! outright (worse than predicting the mean), the rest are weighted
//! proportionally and normalized to sum to 1. Disagreement across the
//! members sets the uncertainty band: ± 1.96 × the unweighted standard
//! deviation of their estimates. That band approximates a 95% interval under
//! a normal-disagreement assumption; it is not a calibrated guarantee.

use crate::bank::YieldModelBank;
use crate::error::EngineError;
use crate::utils::{mae, r2_score, rmse, std_dev};
use ndarray::{ArrayView1, ArrayView2};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Normalized per-learner weights over the viable ensemble members
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnsembleWeights {
    weights: FxHashMap<String, f64>,
}

impl EnsembleWeights {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.weights.get(name).copied()
    }

    pub fn members(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(n, w)| (n.as_str(), *w))
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Validation metrics of the combined predictor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleReport {
    pub ensemble_r2: f64,
    pub ensemble_rmse: f64,
    pub ensemble_mae: f64,
    /// Validation R² per member, before normalization
    pub member_scores: FxHashMap<String, f64>,
}

/// One prediction with its disagreement-derived uncertainty band
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub point: f64,
    pub lower: f64,
    pub upper: f64,
    pub uncertainty: f64,
    /// Raw estimate from every learner that produced one
    pub individual: Vec<(String, f64)>,
}

/// Derive ensemble weights and validation metrics from a trained bank.
///
/// Fails with [`EngineError::EnsembleUnviable`] when no learner achieves a
/// positive validation R²; callers must then fall back to the heuristic.
pub fn build_ensemble(
    bank: &YieldModelBank,
    x_val: ArrayView2<f64>,
    y_val: ArrayView1<f64>,
) -> Result<(EnsembleWeights, EnsembleReport), EngineError> {
    let actual: Vec<f64> = y_val.to_vec();

    // Validation predictions and scores per surviving learner
    let mut predictions: FxHashMap<String, Vec<f64>> = FxHashMap::default();
    let mut member_scores: FxHashMap<String, f64> = FxHashMap::default();

    for name in bank.learner_names() {
        let Some(learner) = bank.get(name) else {
            continue;
        };
        let Ok(pred) = learner.predict_batch(x_val) else {
            continue; // untrained or failed learners contribute nothing
        };
        let score = r2_score(&actual, &pred);
        if score > 0.0 {
            predictions.insert(name.to_string(), pred);
            member_scores.insert(name.to_string(), score);
        } else {
            tracing::info!(learner = name, r2 = score, "excluded from ensemble");
        }
    }

    if member_scores.is_empty() {
        return Err(EngineError::EnsembleUnviable);
    }

    let total: f64 = member_scores.values().sum();
    let weights: FxHashMap<String, f64> = member_scores
        .iter()
        .map(|(name, score)| (name.clone(), score / total))
        .collect();

    // Score the weighted combination on the validation rows
    let n = actual.len();
    let mut combined = vec![0.0; n];
    for (name, weight) in &weights {
        for (i, p) in predictions[name].iter().enumerate() {
            combined[i] += weight * p;
        }
    }

    let report = EnsembleReport {
        ensemble_r2: r2_score(&actual, &combined),
        ensemble_rmse: rmse(&actual, &combined),
        ensemble_mae: mae(&actual, &combined),
        member_scores,
    };
    Ok((EnsembleWeights { weights }, report))
}

/// Weighted point estimate with a disagreement band for one feature vector.
///
/// The point estimate is the weight-sum over ensemble members; the band is
/// ± 1.96 × the unweighted standard deviation of the member estimates.
pub fn predict_with_confidence(
    bank: &YieldModelBank,
    weights: &EnsembleWeights,
    features: &[f64],
) -> Result<PredictionResult, EngineError> {
    let individual = bank.predict_each(features);
    let member_estimates: Vec<f64> = individual
        .iter()
        .filter(|(name, _)| weights.get(name).is_some())
        .map(|(_, p)| *p)
        .collect();

    if member_estimates.is_empty() {
        return Err(EngineError::EnsembleUnviable);
    }

    // Renormalize over members that actually produced an estimate
    let active_total: f64 = individual
        .iter()
        .filter_map(|(name, _)| weights.get(name))
        .sum();
    let point: f64 = individual
        .iter()
        .filter_map(|(name, p)| weights.get(name).map(|w| w / active_total * p))
        .sum();

    let uncertainty = std_dev(&member_estimates);
    Ok(PredictionResult {
        point,
        lower: point - 1.96 * uncertainty,
        upper: point + 1.96 * uncertainty,
        uncertainty,
        individual,
    })
}

/// Evaluate every learner plus the ensemble on a held-out test set
pub fn evaluate_on_test(
    bank: &YieldModelBank,
    weights: &EnsembleWeights,
    x_test: ArrayView2<f64>,
    y_test: ArrayView1<f64>,
) -> FxHashMap<String, (f64, f64, f64)> {
    let actual: Vec<f64> = y_test.to_vec();
    let mut results = FxHashMap::default();

    for name in bank.learner_names() {
        if let Some(learner) = bank.get(name) {
            if let Ok(pred) = learner.predict_batch(x_test) {
                results.insert(
                    name.to_string(),
                    (
                        r2_score(&actual, &pred),
                        rmse(&actual, &pred),
                        mae(&actual, &pred),
                    ),
                );
            }
        }
    }

    let mut combined = Vec::with_capacity(actual.len());
    for i in 0..x_test.nrows() {
        let features: Vec<f64> = x_test.row(i).to_vec();
        if let Ok(result) = predict_with_confidence(bank, weights, &features) {
            combined.push(result.point);
        }
    }
    if combined.len() == actual.len() {
        results.insert(
            "ensemble".to_string(),
            (
                r2_score(&actual, &combined),
                rmse(&actual, &combined),
                mae(&actual, &combined),
            ),
        );
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learners::{
        KnnRegressor, LinearRegression, RandomForestRegressor, TreeConfig, YieldLearner,
    };
    use approx::assert_relative_eq;
    use ndarray::{Array1, Array2};

    fn trained_bank() -> (YieldModelBank, Array2<f64>, Array1<f64>) {
        let n = 40;
        let mut x = Array2::zeros((n, 2));
        let mut y = Array1::zeros(n);
        for i in 0..n {
            x[[i, 0]] = i as f64;
            x[[i, 1]] = ((i * 7) % 11) as f64;
            y[i] = 0.8 * i as f64 + 0.2 * ((i * 7) % 11) as f64 + 3.0;
        }
        let mut bank = YieldModelBank::new(vec![
            (
                "linear_regression".to_string(),
                YieldLearner::Linear(LinearRegression::new()),
            ),
            ("knn".to_string(), YieldLearner::Knn(KnnRegressor::new(3))),
        ]);
        bank.train(x.view(), y.view(), None, None);
        (bank, x, y)
    }

    #[test]
    fn test_weights_sum_to_one_and_members_positive() {
        let (bank, x, y) = trained_bank();
        let (weights, report) = build_ensemble(&bank, x.view(), y.view()).unwrap();

        let total: f64 = weights.members().map(|(_, w)| w).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-6);
        for (name, _) in weights.members() {
            assert!(report.member_scores[name] > 0.0);
        }
    }

    #[test]
    fn test_point_lies_within_member_range() {
        let (bank, x, y) = trained_bank();
        let (weights, _) = build_ensemble(&bank, x.view(), y.view()).unwrap();

        let features = [12.0, 4.0];
        let result = predict_with_confidence(&bank, &weights, &features).unwrap();

        let members: Vec<f64> = result
            .individual
            .iter()
            .filter(|(n, _)| weights.get(n).is_some())
            .map(|(_, p)| *p)
            .collect();
        let min = members.iter().copied().fold(f64::INFINITY, f64::min);
        let max = members.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert!(result.point >= min - 1e-9 && result.point <= max + 1e-9);
    }

    #[test]
    fn test_confidence_band_ordering() {
        let (bank, x, y) = trained_bank();
        let (weights, _) = build_ensemble(&bank, x.view(), y.view()).unwrap();
        let result = predict_with_confidence(&bank, &weights, &[20.0, 5.0]).unwrap();

        assert!(result.lower <= result.point);
        assert!(result.point <= result.upper);
        assert!(result.uncertainty >= 0.0);
        if result.uncertainty == 0.0 {
            assert_relative_eq!(result.lower, result.point, epsilon = 1e-12);
            assert_relative_eq!(result.upper, result.point, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_hopeless_bank_is_unviable() {
        // Constant-target bank scored against a varying validation target
        let n = 20;
        let x_train = Array2::zeros((n, 1));
        let y_train = Array1::from_elem(n, 5.0);
        let mut bank = YieldModelBank::new(vec![(
            "random_forest".to_string(),
            YieldLearner::RandomForest(RandomForestRegressor::new(
                5,
                TreeConfig::default(),
                42,
            )),
        )]);
        bank.train(x_train.view(), y_train.view(), None, None);

        let mut x_val = Array2::zeros((10, 1));
        let mut y_val = Array1::zeros(10);
        for i in 0..10 {
            x_val[[i, 0]] = i as f64;
            y_val[i] = i as f64;
        }
        let err = build_ensemble(&bank, x_val.view(), y_val.view()).unwrap_err();
        assert!(matches!(err, EngineError::EnsembleUnviable));
    }

    #[test]
    fn test_failed_learner_absent_from_weights() {
        let n = 30;
        let mut x = Array2::zeros((n, 1));
        let mut y = Array1::zeros(n);
        for i in 0..n {
            x[[i, 0]] = i as f64;
            y[i] = 2.0 * i as f64;
        }
        let mut bank = YieldModelBank::new(vec![
            (
                "linear_regression".to_string(),
                YieldLearner::Linear(LinearRegression::new()),
            ),
            (
                "broken_forest".to_string(),
                YieldLearner::RandomForest(RandomForestRegressor::new(
                    0,
                    TreeConfig::default(),
                    42,
                )),
            ),
        ]);
        bank.train(x.view(), y.view(), None, None);
        let (weights, _) = build_ensemble(&bank, x.view(), y.view()).unwrap();
        assert!(weights.get("broken_forest").is_none());
        assert!(weights.get("linear_regression").is_some());
    }
}
