//! Error taxonomy for the prediction engine
//!
//! Every externally visible failure degrades to a structured result at the
//! facade boundary; these variants describe what went wrong on the way there.

use thiserror::Error;

/// Engine-level error taxonomy
#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing required field or out-of-range value. No model is invoked.
    #[error("invalid input: {}", issues.join("; "))]
    Validation { issues: Vec<String> },

    /// Model bundle missing or unreadable. Callers degrade to the
    /// deterministic heuristic estimator rather than failing hard.
    #[error("model bundle unavailable: {0}")]
    ModelUnavailable(String),

    /// One learner's fit/evaluate step failed. Training as a whole continues;
    /// the learner is excluded from metrics and the ensemble.
    #[error("learner '{name}' failed to train: {reason}")]
    LearnerTraining { name: String, reason: String },

    /// No learner achieved a positive validation score, so no weighted
    /// ensemble can be formed. Callers fall back to the heuristic.
    #[error("no learner achieved positive validation score")]
    EnsembleUnviable,
}

impl EngineError {
    /// Build a validation error from collected per-field issues
    pub fn validation(issues: Vec<String>) -> Self {
        EngineError::Validation { issues }
    }
}
