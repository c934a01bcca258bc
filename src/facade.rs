//! Inference Facade
//!
//! Orchestrates encode → predict → aggregate → explain for a single request.
//! Input is validated against the schema before any model is touched; when a
//! bundle is missing or unusable the facade degrades to the deterministic
//! heuristic estimator instead of failing. Loaded models live in an immutable
//! session snapshot behind an atomic swap, so concurrent requests never see a
//! half-reloaded state and reads take no long-lived lock.

use crate::bundle::{CropBundle, YieldBundle};
use crate::ensemble;
use crate::error::EngineError;
use crate::heuristic::{self, JitterSource};
use crate::recommend::{self, CropRecommendation};
use crate::schema::{self, RawInput};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

/// Immutable view of whatever bundles loaded successfully
#[derive(Default)]
pub struct Session {
    pub yield_model: Option<YieldBundle>,
    pub crop_model: Option<CropBundle>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub uncertainty: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YieldPredictions {
    pub ensemble_yield: f64,
    pub individual_models: BTreeMap<String, f64>,
    pub confidence_interval: ConfidenceInterval,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YieldResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predictions: Option<YieldPredictions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_conditions: Option<RawInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub recommendations: Vec<CropRecommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_conditions: Option<RawInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComprehensiveResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yield_prediction: Option<YieldPredictions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yield_error: Option<String>,
    pub crop_recommendations: Vec<CropRecommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_conditions: Option<RawInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureWeight {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureImportanceResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub yield_prediction_importance: Vec<FeatureWeight>,
}

/// Stateless-per-request prediction front end
pub struct InferenceFacade {
    session: RwLock<Arc<Session>>,
    jitter: Mutex<JitterSource>,
}

impl InferenceFacade {
    /// Facade with no loaded models; every request uses the heuristic
    pub fn unloaded(jitter: JitterSource) -> Self {
        InferenceFacade {
            session: RwLock::new(Arc::new(Session::default())),
            jitter: Mutex::new(jitter),
        }
    }

    /// Load bundles from a models directory. Missing or unreadable bundles
    /// are tolerated; the affected path degrades to the heuristic.
    pub fn load(models_dir: &Path, jitter: JitterSource) -> Self {
        let facade = Self::unloaded(jitter);
        facade.reload(models_dir);
        facade
    }

    /// Replace the session snapshot with freshly loaded bundles. In-flight
    /// requests keep their previous snapshot untouched.
    pub fn reload(&self, models_dir: &Path) {
        let yield_model = match YieldBundle::load(models_dir) {
            Ok(bundle) if bundle.is_usable() => Some(bundle),
            Ok(_) => {
                tracing::warn!("yield bundle present but not trained; using heuristic");
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, "yield bundle unavailable; using heuristic");
                None
            }
        };
        let crop_model = match CropBundle::load(models_dir) {
            Ok(bundle) if bundle.is_usable() => Some(bundle),
            Ok(_) => {
                tracing::warn!("crop bundle present but not trained; using fallback ranking");
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, "crop bundle unavailable; using fallback ranking");
                None
            }
        };

        let snapshot = Arc::new(Session {
            yield_model,
            crop_model,
        });
        match self.session.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }

    /// Install an already-built session (training pipelines hand over their
    /// freshly trained bundles without a disk round-trip)
    pub fn install(&self, session: Session) {
        let snapshot = Arc::new(session);
        match self.session.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }

    fn snapshot(&self) -> Arc<Session> {
        match self.session.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn jitter_draw<F: FnOnce(&mut JitterSource) -> T, T>(&self, f: F) -> T {
        match self.jitter.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    /// Predict yield for one request
    pub fn predict_yield(&self, input: &RawInput) -> YieldResponse {
        if let Err(err) = schema::validate_input(input) {
            return YieldResponse {
                success: false,
                error: Some(err.to_string()),
                predictions: None,
                input_conditions: Some(input.clone()),
            };
        }

        let session = self.snapshot();
        let predictions = match &session.yield_model {
            Some(bundle) => match self.model_yield(bundle, input) {
                Ok(predictions) => predictions,
                Err(err) => {
                    tracing::warn!(error = %err, "model prediction failed; using heuristic");
                    self.heuristic_yield(input)
                }
            },
            None => self.heuristic_yield(input),
        };

        YieldResponse {
            success: true,
            error: None,
            predictions: Some(predictions),
            input_conditions: Some(input.clone()),
        }
    }

    fn model_yield(
        &self,
        bundle: &YieldBundle,
        input: &RawInput,
    ) -> Result<YieldPredictions, EngineError> {
        let weights = bundle
            .weights
            .as_ref()
            .ok_or(EngineError::EnsembleUnviable)?;
        let features = bundle.encoder.encode(input);
        let result =
            ensemble::predict_with_confidence(&bundle.bank, weights, features.as_slice())?;

        Ok(YieldPredictions {
            ensemble_yield: result.point,
            individual_models: result.individual.into_iter().collect(),
            confidence_interval: ConfidenceInterval {
                lower: Some(result.lower),
                upper: Some(result.upper),
                uncertainty: Some(result.uncertainty),
            },
        })
    }

    fn heuristic_yield(&self, input: &RawInput) -> YieldPredictions {
        let estimate = self.jitter_draw(|jitter| heuristic::estimate_yield(input, jitter));
        YieldPredictions {
            ensemble_yield: round2(estimate.point),
            individual_models: BTreeMap::new(),
            confidence_interval: ConfidenceInterval {
                lower: Some(round2(estimate.lower)),
                upper: Some(round2(estimate.upper)),
                uncertainty: Some(round2(estimate.uncertainty)),
            },
        }
    }

    /// Recommend the top-k crops for one request
    pub fn recommend_crops(&self, input: &RawInput, top_k: usize) -> RecommendationResponse {
        if let Err(err) = schema::validate_input(input) {
            return RecommendationResponse {
                success: false,
                error: Some(err.to_string()),
                recommendations: Vec::new(),
                input_conditions: Some(input.clone()),
            };
        }

        let session = self.snapshot();
        let recommendations = match &session.crop_model {
            Some(bundle) => {
                let features = bundle.encoder.encode(input);
                match recommend::rank_with_models(&bundle.bank, features.as_slice(), input, top_k)
                {
                    Ok(recommendations) => recommendations,
                    Err(err) => {
                        tracing::warn!(error = %err, "classifier ranking failed; using fallback");
                        self.jitter_draw(|jitter| recommend::rank_fallback(input, top_k, jitter))
                    }
                }
            }
            None => self.jitter_draw(|jitter| recommend::rank_fallback(input, top_k, jitter)),
        };

        RecommendationResponse {
            success: true,
            error: None,
            recommendations,
            input_conditions: Some(input.clone()),
        }
    }

    /// Yield prediction plus recommendations plus a one-line summary.
    ///
    /// The two sub-predictions are independent: a failing half is flagged in
    /// its error field while the other half is still returned.
    pub fn comprehensive(&self, input: &RawInput) -> ComprehensiveResponse {
        if let Err(err) = schema::validate_input(input) {
            return ComprehensiveResponse {
                success: false,
                error: Some(err.to_string()),
                yield_prediction: None,
                yield_error: None,
                crop_recommendations: Vec::new(),
                recommendation_error: None,
                input_conditions: Some(input.clone()),
                analysis_summary: None,
            };
        }

        let yield_result = self.predict_yield(input);
        let crop_result = self.recommend_crops(input, 5);

        let mut summary_parts = Vec::new();
        if let Some(predictions) = &yield_result.predictions {
            summary_parts.push(format!(
                "Predicted yield: {:.2} tons/hectare",
                predictions.ensemble_yield
            ));
        }
        if let Some(top) = crop_result.recommendations.first() {
            summary_parts.push(format!(
                "Top recommended crop: {} (Score: {:.3})",
                top.crop, top.score
            ));
        }
        let analysis_summary = if summary_parts.is_empty() {
            None
        } else {
            Some(format!("{}.", summary_parts.join(". ")))
        };

        ComprehensiveResponse {
            success: true,
            error: None,
            yield_error: if yield_result.success {
                None
            } else {
                yield_result.error.clone()
            },
            yield_prediction: yield_result.predictions,
            recommendation_error: if crop_result.success {
                None
            } else {
                crop_result.error.clone()
            },
            crop_recommendations: crop_result.recommendations,
            input_conditions: Some(input.clone()),
            analysis_summary,
        }
    }

    /// Averaged feature importance from the loaded yield bundle
    pub fn feature_importance(&self, top_n: usize) -> FeatureImportanceResponse {
        let session = self.snapshot();
        match &session.yield_model {
            Some(bundle) => {
                let mut entries: Vec<FeatureWeight> = bundle
                    .feature_importance
                    .iter()
                    .map(|(feature, importance)| FeatureWeight {
                        feature: feature.clone(),
                        importance: *importance,
                    })
                    .collect();
                entries.sort_by(|a, b| {
                    b.importance
                        .partial_cmp(&a.importance)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                entries.truncate(top_n);
                FeatureImportanceResponse {
                    success: true,
                    error: None,
                    yield_prediction_importance: entries,
                }
            }
            None => FeatureImportanceResponse {
                success: false,
                error: Some(EngineError::ModelUnavailable("yield bundle".to_string()).to_string()),
                yield_prediction_importance: Vec::new(),
            },
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
