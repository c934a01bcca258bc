//! Utility modules for the prediction engine
//!
//! Contains shared functionality used across training and inference:
//! - Metrics: R²/RMSE/MAE and accuracy scoring
//! - Splitting: seeded train/test and k-fold partitioning

pub mod metrics;
pub mod split;

// Re-export commonly used helpers
pub use metrics::{accuracy, mae, mean, r2_score, rmse, std_dev};
pub use split::{kfold_indices, take_labels, take_rows, take_values, train_test_split_indices};
