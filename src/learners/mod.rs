//! Heterogeneous Learners
//!
//! Capability-tagged learner variants for the two model banks. Each variant
//! declares at construction which of {point-estimate, class-probabilities,
//! feature-importance} it supports, so composition never probes for methods
//! at runtime.
//!
//! Regression (yield) family: linear, ridge, lasso, knn, decision tree,
//! random forest, gradient boosting. Classification (crop) family: logistic,
//! knn, decision tree, random forest.

pub mod boost;
pub mod forest;
pub mod knn;
pub mod linear;
pub mod logistic;
pub mod tree;

use anyhow::Result;
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

pub use boost::GradientBoostingRegressor;
pub use forest::{RandomForestClassifier, RandomForestRegressor};
pub use knn::{KnnClassifier, KnnRegressor};
pub use linear::{LassoRegression, LinearRegression, RidgeRegression};
pub use logistic::LogisticRegression;
pub use tree::{DecisionTreeClassifier, DecisionTreeRegressor, TreeConfig};

/// What a learner can produce, declared at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    PointEstimate,
    ClassProbabilities,
    FeatureImportance,
}

/// A yield (regression) learner variant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum YieldLearner {
    Linear(LinearRegression),
    Ridge(RidgeRegression),
    Lasso(LassoRegression),
    Knn(KnnRegressor),
    DecisionTree(DecisionTreeRegressor),
    RandomForest(RandomForestRegressor),
    GradientBoosting(GradientBoostingRegressor),
}

impl YieldLearner {
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            YieldLearner::Linear(_)
            | YieldLearner::Ridge(_)
            | YieldLearner::Lasso(_)
            | YieldLearner::Knn(_) => &[Capability::PointEstimate],
            YieldLearner::DecisionTree(_)
            | YieldLearner::RandomForest(_)
            | YieldLearner::GradientBoosting(_) => {
                &[Capability::PointEstimate, Capability::FeatureImportance]
            }
        }
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        let targets: Vec<f64> = y.to_vec();
        match self {
            YieldLearner::Linear(m) => m.fit(x, y),
            YieldLearner::Ridge(m) => m.fit(x, y),
            YieldLearner::Lasso(m) => m.fit(x, y),
            YieldLearner::Knn(m) => m.fit(x, &targets),
            YieldLearner::DecisionTree(m) => m.fit(x, &targets),
            YieldLearner::RandomForest(m) => m.fit(x, &targets),
            YieldLearner::GradientBoosting(m) => m.fit(x, &targets),
        }
    }

    pub fn predict(&self, features: &[f64]) -> Result<f64> {
        match self {
            YieldLearner::Linear(m) => m.predict(features),
            YieldLearner::Ridge(m) => m.predict(features),
            YieldLearner::Lasso(m) => m.predict(features),
            YieldLearner::Knn(m) => m.predict(features),
            YieldLearner::DecisionTree(m) => m.predict(features),
            YieldLearner::RandomForest(m) => m.predict(features),
            YieldLearner::GradientBoosting(m) => m.predict(features),
        }
    }

    pub fn predict_batch(&self, x: ArrayView2<f64>) -> Result<Vec<f64>> {
        (0..x.nrows())
            .map(|i| self.predict(&x.row(i).to_vec()))
            .collect()
    }

    /// Normalized split-gain importances, for variants that expose them
    pub fn feature_importance(&self) -> Option<Vec<f64>> {
        match self {
            YieldLearner::DecisionTree(m) => m.feature_importance(),
            YieldLearner::RandomForest(m) => m.feature_importance(),
            YieldLearner::GradientBoosting(m) => m.feature_importance(),
            _ => None,
        }
    }

    /// Untrained clone with identical configuration, for cross-validation
    pub fn fresh(&self) -> YieldLearner {
        match self {
            YieldLearner::Linear(_) => YieldLearner::Linear(LinearRegression::new()),
            YieldLearner::Ridge(m) => YieldLearner::Ridge(RidgeRegression::new(m.alpha)),
            YieldLearner::Lasso(m) => YieldLearner::Lasso(LassoRegression::new(m.alpha)),
            YieldLearner::Knn(m) => YieldLearner::Knn(KnnRegressor::new(m.k)),
            YieldLearner::DecisionTree(m) => {
                YieldLearner::DecisionTree(DecisionTreeRegressor::new(m.config.clone()))
            }
            YieldLearner::RandomForest(m) => YieldLearner::RandomForest(
                RandomForestRegressor::new(m.n_trees, m.config.clone(), m.seed),
            ),
            YieldLearner::GradientBoosting(m) => {
                YieldLearner::GradientBoosting(GradientBoostingRegressor::new(
                    m.n_estimators,
                    m.learning_rate,
                    m.config.clone(),
                ))
            }
        }
    }
}

/// A crop (classification) learner variant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CropLearner {
    Logistic(LogisticRegression),
    Knn(KnnClassifier),
    DecisionTree(DecisionTreeClassifier),
    RandomForest(RandomForestClassifier),
}

impl CropLearner {
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            CropLearner::Logistic(_) | CropLearner::Knn(_) => {
                &[Capability::ClassProbabilities]
            }
            CropLearner::DecisionTree(_) | CropLearner::RandomForest(_) => &[
                Capability::ClassProbabilities,
                Capability::FeatureImportance,
            ],
        }
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: &[usize], n_classes: usize) -> Result<()> {
        match self {
            CropLearner::Logistic(m) => m.fit(x, y, n_classes),
            CropLearner::Knn(m) => m.fit(x, y, n_classes),
            CropLearner::DecisionTree(m) => m.fit(x, y, n_classes),
            CropLearner::RandomForest(m) => m.fit(x, y, n_classes),
        }
    }

    pub fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>> {
        match self {
            CropLearner::Logistic(m) => m.predict_proba(features),
            CropLearner::Knn(m) => m.predict_proba(features),
            CropLearner::DecisionTree(m) => m.predict_proba(features),
            CropLearner::RandomForest(m) => m.predict_proba(features),
        }
    }

    /// Most probable class index
    pub fn predict_class(&self, features: &[f64]) -> Result<usize> {
        let probs = self.predict_proba(features)?;
        Ok(argmax(&probs))
    }

    pub fn feature_importance(&self) -> Option<Vec<f64>> {
        match self {
            CropLearner::DecisionTree(m) => m.feature_importance(),
            CropLearner::RandomForest(m) => m.feature_importance(),
            _ => None,
        }
    }

    pub fn fresh(&self) -> CropLearner {
        match self {
            CropLearner::Logistic(m) => CropLearner::Logistic(LogisticRegression::new(
                m.learning_rate,
                m.max_iter,
                m.l2,
            )),
            CropLearner::Knn(m) => CropLearner::Knn(KnnClassifier::new(m.k)),
            CropLearner::DecisionTree(m) => {
                CropLearner::DecisionTree(DecisionTreeClassifier::new(m.config.clone()))
            }
            CropLearner::RandomForest(m) => CropLearner::RandomForest(
                RandomForestClassifier::new(m.n_trees, m.config.clone(), m.seed),
            ),
        }
    }
}

pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Default regression bank: the heterogeneous learner set with the stock
/// configurations used before tuning
pub fn default_yield_learners() -> Vec<(String, YieldLearner)> {
    let forest_config = TreeConfig {
        max_depth: 10,
        min_samples_split: 5,
        min_samples_leaf: 2,
    };
    let boost_config = TreeConfig {
        max_depth: 6,
        min_samples_split: 2,
        min_samples_leaf: 1,
    };
    vec![
        (
            "random_forest".to_string(),
            YieldLearner::RandomForest(RandomForestRegressor::new(100, forest_config.clone(), 42)),
        ),
        (
            "gradient_boosting".to_string(),
            YieldLearner::GradientBoosting(GradientBoostingRegressor::new(
                100,
                0.1,
                boost_config,
            )),
        ),
        (
            "decision_tree".to_string(),
            YieldLearner::DecisionTree(DecisionTreeRegressor::new(forest_config)),
        ),
        (
            "linear_regression".to_string(),
            YieldLearner::Linear(LinearRegression::new()),
        ),
        (
            "ridge".to_string(),
            YieldLearner::Ridge(RidgeRegression::new(1.0)),
        ),
        (
            "lasso".to_string(),
            YieldLearner::Lasso(LassoRegression::new(0.1)),
        ),
        ("knn".to_string(), YieldLearner::Knn(KnnRegressor::new(5))),
    ]
}

/// Default classification bank
pub fn default_crop_learners() -> Vec<(String, CropLearner)> {
    let forest_config = TreeConfig {
        max_depth: 10,
        min_samples_split: 5,
        min_samples_leaf: 2,
    };
    vec![
        (
            "random_forest".to_string(),
            CropLearner::RandomForest(RandomForestClassifier::new(100, forest_config.clone(), 42)),
        ),
        (
            "decision_tree".to_string(),
            CropLearner::DecisionTree(DecisionTreeClassifier::new(forest_config)),
        ),
        (
            "logistic_regression".to_string(),
            CropLearner::Logistic(LogisticRegression::new(0.1, 1000, 0.0)),
        ),
        ("knn".to_string(), CropLearner::Knn(KnnClassifier::new(5))),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_are_declared_per_variant() {
        let forest = YieldLearner::RandomForest(RandomForestRegressor::new(
            10,
            TreeConfig::default(),
            42,
        ));
        assert!(forest.capabilities().contains(&Capability::FeatureImportance));

        let linear = YieldLearner::Linear(LinearRegression::new());
        assert!(!linear.capabilities().contains(&Capability::FeatureImportance));
        assert!(linear.capabilities().contains(&Capability::PointEstimate));
    }

    #[test]
    fn test_fresh_resets_trained_state() {
        let x = ndarray::array![[0.0], [1.0], [2.0], [3.0], [4.0]];
        let y = ndarray::array![0.0, 1.0, 2.0, 3.0, 4.0];
        let mut learner = YieldLearner::Linear(LinearRegression::new());
        learner.fit(x.view(), y.view()).unwrap();
        assert!(learner.predict(&[1.0]).is_ok());
        assert!(learner.fresh().predict(&[1.0]).is_err());
    }

    #[test]
    fn test_default_banks_have_unique_names() {
        let yield_names: Vec<String> = default_yield_learners()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        let mut deduped = yield_names.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), yield_names.len());
        assert_eq!(yield_names.len(), 7);
        assert_eq!(default_crop_learners().len(), 4);
    }
}
