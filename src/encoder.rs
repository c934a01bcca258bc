//! Feature Encoding
//!
//! Turns a raw attribute mapping into a fixed-order numeric feature vector:
//! numeric features first, label-encoded categoricals after, in an order
//! recorded at fit time and identical between training and inference.
//! Missing attributes are filled from the static defaulting table; an unseen
//! category at inference time encodes to 0 instead of failing.

use crate::schema::{self, RawInput, CATEGORICAL_FEATURES, NUMERIC_FEATURES};
use anyhow::{bail, Result};
use ndarray::{Array2, ArrayView2};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Fixed-order numeric feature vector, immutable after creation
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Fitted categorical encoder: category string to stable integer code
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LabelEncoder {
    classes: Vec<String>,
    #[serde(skip)]
    index: FxHashMap<String, usize>,
}

impl LabelEncoder {
    /// Fit from observed values; codes follow sorted class order
    pub fn fit(values: impl IntoIterator<Item = String>) -> Self {
        let mut classes: Vec<String> = values.into_iter().collect();
        classes.sort();
        classes.dedup();
        let mut encoder = LabelEncoder {
            classes,
            index: FxHashMap::default(),
        };
        encoder.rebuild_index();
        encoder
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
    }

    /// Encode a category; unseen values fall back to 0 to preserve
    /// availability at inference time
    pub fn transform(&self, value: &str) -> usize {
        self.index.get(value).copied().unwrap_or(0)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

/// Per-feature standardization (zero mean, unit variance)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl StandardScaler {
    /// Fit means and standard deviations column-wise. Constant columns keep
    /// std 1.0 so scaling never divides by zero.
    pub fn fit(x: ArrayView2<f64>) -> Self {
        let n_rows = x.nrows().max(1) as f64;
        let n_cols = x.ncols();
        let mut mean = vec![0.0; n_cols];
        let mut std = vec![0.0; n_cols];

        for col in 0..n_cols {
            let mut sum = 0.0;
            for row in 0..x.nrows() {
                sum += x[[row, col]];
            }
            mean[col] = sum / n_rows;
        }
        for col in 0..n_cols {
            let mut sq = 0.0;
            for row in 0..x.nrows() {
                let d = x[[row, col]] - mean[col];
                sq += d * d;
            }
            let s = (sq / n_rows).sqrt();
            std[col] = if s > 0.0 { s } else { 1.0 };
        }

        StandardScaler { mean, std }
    }

    pub fn transform_row(&self, row: &mut [f64]) {
        for (i, value) in row.iter_mut().enumerate() {
            *value = (*value - self.mean[i]) / self.std[i];
        }
    }

    pub fn transform_matrix(&self, x: &mut Array2<f64>) {
        for mut row in x.rows_mut() {
            for (i, value) in row.iter_mut().enumerate() {
                *value = (*value - self.mean[i]) / self.std[i];
            }
        }
    }
}

/// Fitted feature encoder: label encoders, optional scaler, and the recorded
/// feature order. Persisted as part of the model bundle; never refit at
/// inference time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureEncoder {
    label_encoders: FxHashMap<String, LabelEncoder>,
    scaler: Option<StandardScaler>,
    feature_names: Vec<String>,
}

impl FeatureEncoder {
    /// Fit label encoders and record the feature order from a training set.
    /// The scaler is fitted separately (training rows only) via
    /// [`FeatureEncoder::fit_scaler`].
    pub fn fit(records: &[RawInput]) -> Result<Self> {
        if records.is_empty() {
            bail!("Cannot fit encoder on an empty dataset");
        }

        let mut label_encoders = FxHashMap::default();
        for col in CATEGORICAL_FEATURES {
            let values = records.iter().map(|r| {
                schema::str_field(r, col)
                    .map(str::to_string)
                    .unwrap_or_else(|| default_category(col))
            });
            label_encoders.insert(col.to_string(), LabelEncoder::fit(values));
        }

        let mut feature_names: Vec<String> =
            NUMERIC_FEATURES.iter().map(|f| f.to_string()).collect();
        feature_names.extend(CATEGORICAL_FEATURES.iter().map(|f| format!("{}_encoded", f)));

        Ok(FeatureEncoder {
            label_encoders,
            scaler: None,
            feature_names,
        })
    }

    /// Fit the standard scaler on an already-encoded training matrix
    pub fn fit_scaler(&mut self, x_train: ArrayView2<f64>) {
        self.scaler = Some(StandardScaler::fit(x_train));
    }

    /// Encode one request into a complete feature vector: defaults applied,
    /// categoricals label-encoded, scaler applied when fitted
    pub fn encode(&self, input: &RawInput) -> FeatureVector {
        let merged = schema::apply_defaults(input);
        let mut values = self.encode_unscaled(&merged);
        if let Some(scaler) = &self.scaler {
            scaler.transform_row(&mut values);
        }
        FeatureVector(values)
    }

    /// Encode a batch of records into an unscaled matrix (training path)
    pub fn encode_matrix(&self, records: &[RawInput]) -> Array2<f64> {
        let n_features = self.feature_names.len();
        let mut x = Array2::zeros((records.len(), n_features));
        for (i, record) in records.iter().enumerate() {
            let merged = schema::apply_defaults(record);
            let row = self.encode_unscaled(&merged);
            for (j, value) in row.into_iter().enumerate() {
                x[[i, j]] = value;
            }
        }
        x
    }

    fn encode_unscaled(&self, merged: &RawInput) -> Vec<f64> {
        let mut values = Vec::with_capacity(self.feature_names.len());
        for name in NUMERIC_FEATURES {
            values.push(schema::num_field(merged, name).unwrap_or(0.0));
        }
        for col in CATEGORICAL_FEATURES {
            let raw = schema::str_field(merged, col).unwrap_or("");
            let code = self
                .label_encoders
                .get(col)
                .map(|enc| enc.transform(raw))
                .unwrap_or(0);
            values.push(code as f64);
        }
        values
    }

    /// Apply the fitted scaler to an unscaled matrix (training path)
    pub fn apply_scaler(&self, x: &mut Array2<f64>) {
        if let Some(scaler) = &self.scaler {
            scaler.transform_matrix(x);
        }
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn label_encoder(&self, column: &str) -> Option<&LabelEncoder> {
        self.label_encoders.get(column)
    }

    /// Rebuild the skipped lookup indices after deserialization
    pub fn restore_after_load(&mut self) {
        for encoder in self.label_encoders.values_mut() {
            encoder.rebuild_index();
        }
    }
}

fn default_category(column: &str) -> String {
    schema::str_field(&schema::default_record(), column)
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn record(state: &str, crop: &str, ph: f64) -> RawInput {
        json!({ "state": state, "crop": crop, "soil_ph": ph })
            .as_object()
            .unwrap()
            .clone()
    }

    #[test]
    fn test_feature_order_is_stable() {
        let records = vec![record("punjab", "Rice", 6.8), record("haryana", "Wheat", 7.0)];
        let encoder = FeatureEncoder::fit(&records).unwrap();

        assert_eq!(encoder.n_features(), NUMERIC_FEATURES.len() + CATEGORICAL_FEATURES.len());
        assert_eq!(encoder.feature_names()[0], "variability");
        let first_categorical = &encoder.feature_names()[NUMERIC_FEATURES.len()];
        assert_eq!(first_categorical, "state_encoded");

        let a = encoder.encode(&record("punjab", "Rice", 6.8));
        let b = encoder.encode(&record("punjab", "Rice", 6.8));
        assert_eq!(a, b);
    }

    #[test]
    fn test_unseen_category_encodes_to_zero() {
        let records = vec![record("punjab", "Rice", 6.8)];
        let encoder = FeatureEncoder::fit(&records).unwrap();
        let state_encoder = encoder.label_encoder("state").unwrap();
        assert_eq!(state_encoder.transform("atlantis"), 0);
    }

    #[test]
    fn test_missing_attributes_use_defaults() {
        let records = vec![record("punjab", "Rice", 6.8)];
        let encoder = FeatureEncoder::fit(&records).unwrap();

        let mut partial = RawInput::new();
        partial.insert("state".to_string(), json!("punjab"));
        let fv = encoder.encode(&partial);

        // soil_ph defaults to 6.8 (index 11 in the numeric list)
        assert_relative_eq!(fv.as_slice()[11], 6.8, epsilon = 1e-12);
    }

    #[test]
    fn test_scaler_standardizes_training_matrix() {
        let records: Vec<RawInput> = (0..10)
            .map(|i| record("punjab", "Rice", 5.5 + 0.3 * i as f64))
            .collect();
        let mut encoder = FeatureEncoder::fit(&records).unwrap();
        let x = encoder.encode_matrix(&records);
        encoder.fit_scaler(x.view());

        let mut scaled = x.clone();
        if let Some(scaler) = &encoder.scaler {
            scaler.transform_matrix(&mut scaled);
        }
        // soil_ph column: mean ~0, population std ~1 after scaling
        let col: Vec<f64> = (0..10).map(|i| scaled[[i, 11]]).collect();
        assert_relative_eq!(crate::utils::mean(&col), 0.0, epsilon = 1e-9);
        assert_relative_eq!(crate::utils::std_dev(&col), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_label_encoder_round_trips_through_serde() {
        let encoder = LabelEncoder::fit(vec!["b".to_string(), "a".to_string(), "b".to_string()]);
        let json = serde_json::to_string(&encoder).unwrap();
        let mut restored: LabelEncoder = serde_json::from_str(&json).unwrap();
        restored.rebuild_index();
        assert_eq!(restored.transform("a"), 0);
        assert_eq!(restored.transform("b"), 1);
    }
}
