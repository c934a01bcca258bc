//! Persisted Model Bundles
//!
//! One self-describing JSON artifact per logical model: the yield bundle
//! carries encoder state, the regression bank, ensemble weights, and the
//! feature-importance cache; the crop bundle carries encoder state and the
//! classification bank. Both expose a trained flag that is checked before
//! use. Bundles are written once per training run and loaded wholesale for
//! inference; they are treated as read-only after load.

use crate::bank::{CropModelBank, YieldModelBank};
use crate::encoder::FeatureEncoder;
use crate::ensemble::EnsembleWeights;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const YIELD_BUNDLE_FILE: &str = "yield_predictor.json";
pub const CROP_BUNDLE_FILE: &str = "crop_recommender.json";

/// Trained yield model: encoder, bank, weights, importance cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YieldBundle {
    pub encoder: FeatureEncoder,
    pub bank: YieldModelBank,
    /// Absent when the ensemble build failed (no viable member)
    pub weights: Option<EnsembleWeights>,
    pub feature_importance: FxHashMap<String, f64>,
    pub trained: bool,
    pub trained_at: DateTime<Utc>,
}

/// Trained crop model: encoder and classification bank
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropBundle {
    pub encoder: FeatureEncoder,
    pub bank: CropModelBank,
    pub trained: bool,
    pub trained_at: DateTime<Utc>,
}

impl YieldBundle {
    pub fn save(&self, dir: &Path) -> Result<()> {
        save_json(&dir.join(YIELD_BUNDLE_FILE), self)
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let mut bundle: YieldBundle = load_json(&dir.join(YIELD_BUNDLE_FILE))?;
        bundle.encoder.restore_after_load();
        Ok(bundle)
    }

    /// A bundle is usable only when its trained flag is set and an ensemble
    /// was actually formed
    pub fn is_usable(&self) -> bool {
        self.trained && self.bank.is_trained && self.weights.is_some()
    }
}

impl CropBundle {
    pub fn save(&self, dir: &Path) -> Result<()> {
        save_json(&dir.join(CROP_BUNDLE_FILE), self)
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let mut bundle: CropBundle = load_json(&dir.join(CROP_BUNDLE_FILE))?;
        bundle.encoder.restore_after_load();
        Ok(bundle)
    }

    pub fn is_usable(&self) -> bool {
        self.trained && self.bank.is_trained && !self.bank.classes().is_empty()
    }
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create model directory: {:?}", parent))?;
    }
    let contents = serde_json::to_string(value).context("Failed to serialize model bundle")?;
    fs::write(path, contents)
        .with_context(|| format!("Failed to write model bundle: {:?}", path))?;
    tracing::info!(path = %path.display(), "saved model bundle");
    Ok(())
}

fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read model bundle: {:?}", path))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse model bundle: {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learners::{LinearRegression, YieldLearner};
    use crate::schema::RawInput;
    use ndarray::{Array1, Array2};
    use serde_json::json;

    fn scratch_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "crop_advisor_{}_{}",
            tag,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn record(ph: f64) -> RawInput {
        json!({ "state": "punjab", "crop": "Rice", "soil_ph": ph })
            .as_object()
            .unwrap()
            .clone()
    }

    #[test]
    fn test_yield_bundle_round_trip() {
        let records: Vec<RawInput> = (0..12).map(|i| record(5.5 + 0.2 * i as f64)).collect();
        let mut encoder = FeatureEncoder::fit(&records).unwrap();
        let x = encoder.encode_matrix(&records);
        encoder.fit_scaler(x.view());

        let n = 20;
        let mut xm = Array2::zeros((n, 2));
        let mut y = Array1::zeros(n);
        for i in 0..n {
            xm[[i, 0]] = i as f64;
            y[i] = 3.0 * i as f64;
        }
        let mut bank = YieldModelBank::new(vec![(
            "linear_regression".to_string(),
            YieldLearner::Linear(LinearRegression::new()),
        )]);
        bank.train(xm.view(), y.view(), None, None);
        let (weights, _) =
            crate::ensemble::build_ensemble(&bank, xm.view(), y.view()).unwrap();

        let bundle = YieldBundle {
            encoder,
            bank,
            weights: Some(weights),
            feature_importance: FxHashMap::default(),
            trained: true,
            trained_at: Utc::now(),
        };

        let dir = scratch_dir("yield_bundle");
        bundle.save(&dir).unwrap();
        let restored = YieldBundle::load(&dir).unwrap();
        assert!(restored.is_usable());
        assert_eq!(
            restored.encoder.feature_names(),
            bundle.encoder.feature_names()
        );
        // Restored learners still predict
        let preds = restored.bank.predict_each(&[2.0, 0.0]);
        assert_eq!(preds.len(), 1);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_bundle_load_fails() {
        let dir = scratch_dir("missing_bundle");
        assert!(YieldBundle::load(&dir).is_err());
    }

    #[test]
    fn test_untrained_bundle_is_not_usable() {
        let records = vec![record(6.5)];
        let encoder = FeatureEncoder::fit(&records).unwrap();
        let bundle = CropBundle {
            encoder,
            bank: CropModelBank::with_default_learners(),
            trained: false,
            trained_at: Utc::now(),
        };
        assert!(!bundle.is_usable());
    }
}
