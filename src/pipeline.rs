//! Training Pipeline
//!
//! Batch, single-pass orchestration of the full training run: encode and
//! scale an already-generated dataset, fit both model banks, grid-search the
//! tunable learners, derive ensemble weights on the held-out rows, and
//! persist the two bundles. Dataset *generation* (database loading, synthetic
//! features) is an external collaborator; this pipeline consumes its records.

use crate::bank::{
    ClassificationMetrics, CropModelBank, RegressionMetrics, YieldModelBank,
};
use crate::bundle::{CropBundle, YieldBundle};
use crate::encoder::FeatureEncoder;
use crate::ensemble::{self, EnsembleReport};
use crate::schema::{self, RawInput};
use crate::tuner::{self, TunedConfig};
use crate::utils::{take_rows, take_values, train_test_split_indices};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use ndarray::Array1;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const SPLIT_SEED: u64 = 42;
const TEST_SIZE: f64 = 0.2;

/// Everything a training run reports back to its caller
#[derive(Debug, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub n_records: usize,
    pub n_features: usize,
    pub yield_scores: FxHashMap<String, Option<RegressionMetrics>>,
    pub yield_tuning: FxHashMap<String, Option<TunedConfig>>,
    pub ensemble: Option<EnsembleReport>,
    /// Per-model (R², RMSE, MAE) on the held-out rows, including "ensemble"
    pub test_metrics: FxHashMap<String, (f64, f64, f64)>,
    pub crop_scores: FxHashMap<String, Option<ClassificationMetrics>>,
    pub crop_tuning: FxHashMap<String, Option<TunedConfig>>,
}

/// Read a dataset file: a JSON array of record objects
pub fn load_records(path: &Path) -> Result<Vec<RawInput>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset: {:?}", path))?;
    let records: Vec<RawInput> =
        serde_json::from_str(&contents).context("Failed to parse dataset JSON")?;
    Ok(records)
}

/// Run the full training pipeline and persist both bundles into `models_dir`
pub fn train_from_records(records: &[RawInput], models_dir: &Path) -> Result<TrainingSummary> {
    if records.len() < 10 {
        bail!(
            "Training requires at least 10 records, got {}",
            records.len()
        );
    }

    tracing::info!(records = records.len(), "starting training run");

    // Targets: yield for regression, crop label for classification
    let y_yield: Array1<f64> = Array1::from_iter(
        records
            .iter()
            .map(|r| schema::num_field(r, "average_yield").unwrap_or(4.0)),
    );
    let labels: Vec<String> = records
        .iter()
        .map(|r| {
            schema::str_field(r, "crop")
                .unwrap_or("Rice")
                .to_string()
        })
        .collect();

    // Encode everything, fit the scaler on the training rows only
    let mut encoder = FeatureEncoder::fit(records)?;
    let mut x_all = encoder.encode_matrix(records);
    let (train_idx, test_idx) =
        train_test_split_indices(records.len(), TEST_SIZE, SPLIT_SEED);
    let x_train_unscaled = take_rows(x_all.view(), &train_idx);
    encoder.fit_scaler(x_train_unscaled.view());
    encoder.apply_scaler(&mut x_all);

    let x_train = take_rows(x_all.view(), &train_idx);
    let x_test = take_rows(x_all.view(), &test_idx);
    let y_train = take_values(y_yield.view(), &train_idx);
    let y_test = take_values(y_yield.view(), &test_idx);
    let labels_train: Vec<String> = train_idx.iter().map(|&i| labels[i].clone()).collect();
    let labels_test: Vec<String> = test_idx.iter().map(|&i| labels[i].clone()).collect();

    // Yield model: train, tune, weight
    tracing::info!("training yield prediction model");
    let mut yield_bank = YieldModelBank::with_default_learners();
    let yield_scores = yield_bank.train(
        x_train.view(),
        y_train.view(),
        Some(x_test.view()),
        Some(y_test.view()),
    );

    tracing::info!("optimizing yield hyperparameters");
    let yield_tuning = tuner::tune_yield_bank(&mut yield_bank, x_train.view(), y_train.view());

    tracing::info!("building ensemble");
    let (weights, ensemble_report) =
        match ensemble::build_ensemble(&yield_bank, x_test.view(), y_test.view()) {
            Ok((weights, report)) => (Some(weights), Some(report)),
            Err(err) => {
                tracing::warn!(error = %err, "ensemble build failed; bundle will rely on heuristic fallback");
                (None, None)
            }
        };

    let test_metrics = match &weights {
        Some(w) => ensemble::evaluate_on_test(&yield_bank, w, x_test.view(), y_test.view()),
        None => FxHashMap::default(),
    };

    let feature_importance = yield_bank.feature_importance(encoder.feature_names());
    let yield_bundle = YieldBundle {
        encoder: encoder.clone(),
        bank: yield_bank,
        weights,
        feature_importance,
        trained: true,
        trained_at: Utc::now(),
    };
    yield_bundle.save(models_dir)?;

    // Crop model: train, tune
    tracing::info!("training crop recommendation model");
    let mut crop_bank = CropModelBank::with_default_learners();
    let crop_scores = crop_bank.train(
        x_train.view(),
        &labels_train,
        Some(x_test.view()),
        Some(labels_test.as_slice()),
    );

    tracing::info!("optimizing crop hyperparameters");
    let crop_tuning = tuner::tune_crop_bank(&mut crop_bank, x_train.view(), &labels_train);

    let crop_bundle = CropBundle {
        encoder: encoder.clone(),
        bank: crop_bank,
        trained: true,
        trained_at: Utc::now(),
    };
    crop_bundle.save(models_dir)?;

    Ok(TrainingSummary {
        n_records: records.len(),
        n_features: encoder.n_features(),
        yield_scores,
        yield_tuning,
        ensemble: ensemble_report,
        test_metrics,
        crop_scores,
        crop_tuning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Deterministic learnable dataset: yield follows soil chemistry, crop
    /// follows a moisture threshold
    fn synthetic_records(n: usize) -> Vec<RawInput> {
        (0..n)
            .map(|i| {
                let ph = 5.5 + 0.05 * (i % 40) as f64;
                let moisture = 30.0 + (i % 50) as f64;
                let nitrogen = 30.0 + (i % 60) as f64;
                let yield_t = 2.0 + 0.3 * ph + 0.02 * moisture + 0.01 * nitrogen;
                let crop = if moisture > 55.0 { "Rice" } else { "Wheat" };
                json!({
                    "state": if i % 2 == 0 { "punjab" } else { "haryana" },
                    "crop": crop,
                    "district": "ludhiana",
                    "average_yield": yield_t,
                    "soil_ph": ph,
                    "soil_moisture": moisture,
                    "soil_nitrogen": nitrogen,
                    "soil_phosphorus": 40.0 + (i % 20) as f64,
                    "soil_potassium": 150.0 + (i % 30) as f64,
                    "avg_temperature": 22.0 + (i % 10) as f64,
                    "humidity": 55.0 + (i % 15) as f64,
                    "rainfall": 3.0 + (i % 6) as f64
                })
                .as_object()
                .unwrap()
                .clone()
            })
            .collect()
    }

    #[test]
    fn test_tiny_dataset_rejected() {
        let records = synthetic_records(5);
        let dir = std::env::temp_dir().join("crop_advisor_pipeline_reject");
        assert!(train_from_records(&records, &dir).is_err());
    }
}
