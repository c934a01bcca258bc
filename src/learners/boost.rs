//! Gradient Boosting Regressor
//!
//! Stagewise least-squares boosting: start from the target mean, then fit
//! shallow regression trees to the residuals, each damped by the learning
//! rate. Feature importance accumulates split gains across all stages.

use super::tree::{grow_regression, normalize_gains, Tree, TreeConfig};
use anyhow::{bail, Result};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub config: TreeConfig,
    init: f64,
    trees: Vec<Tree>,
    n_features: usize,
    fitted: bool,
}

impl GradientBoostingRegressor {
    pub fn new(n_estimators: usize, learning_rate: f64, config: TreeConfig) -> Self {
        GradientBoostingRegressor {
            n_estimators,
            learning_rate,
            config,
            init: 0.0,
            trees: Vec::new(),
            n_features: 0,
            fitted: false,
        }
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: &[f64]) -> Result<()> {
        if x.nrows() == 0 {
            bail!("Cannot fit gradient boosting on an empty dataset");
        }
        if self.n_estimators == 0 {
            bail!("Gradient boosting requires at least one estimator");
        }
        if !(0.0..=1.0).contains(&self.learning_rate) || self.learning_rate == 0.0 {
            bail!(
                "Gradient boosting learning rate must be in (0, 1], got {}",
                self.learning_rate
            );
        }

        let n = x.nrows();
        let indices: Vec<usize> = (0..n).collect();
        self.init = y.iter().sum::<f64>() / n as f64;
        self.trees = Vec::with_capacity(self.n_estimators);

        let mut residual: Vec<f64> = y.iter().map(|v| v - self.init).collect();
        for _ in 0..self.n_estimators {
            let tree = grow_regression(x, &residual, &indices, &self.config, None)?;
            for (i, r) in residual.iter_mut().enumerate() {
                let row: Vec<f64> = x.row(i).to_vec();
                *r -= self.learning_rate * tree.leaf_value(&row)[0];
            }
            self.trees.push(tree);
        }

        self.n_features = x.ncols();
        self.fitted = true;
        Ok(())
    }

    pub fn predict(&self, features: &[f64]) -> Result<f64> {
        if !self.fitted {
            bail!("Gradient boosting regressor is not fitted");
        }
        let boost: f64 = self
            .trees
            .iter()
            .map(|tree| self.learning_rate * tree.leaf_value(features)[0])
            .sum();
        Ok(self.init + boost)
    }

    pub fn feature_importance(&self) -> Option<Vec<f64>> {
        if !self.fitted {
            return None;
        }
        let mut totals = vec![0.0; self.n_features];
        for tree in &self.trees {
            for (i, g) in tree.gains().iter().enumerate() {
                totals[i] += g;
            }
        }
        Some(normalize_gains(&totals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_boosting_fits_linear_trend() {
        let mut x = Array2::zeros((30, 1));
        let mut y = Vec::with_capacity(30);
        for i in 0..30 {
            x[[i, 0]] = i as f64;
            y.push(0.5 * i as f64 + 2.0);
        }
        let mut model = GradientBoostingRegressor::new(
            100,
            0.1,
            TreeConfig {
                max_depth: 3,
                min_samples_split: 2,
                min_samples_leaf: 1,
            },
        );
        model.fit(x.view(), &y).unwrap();
        let p = model.predict(&[15.0]).unwrap();
        assert!((p - 9.5).abs() < 0.5, "predicted {}", p);
    }

    #[test]
    fn test_invalid_learning_rate_rejected() {
        let x = Array2::zeros((5, 1));
        let y = vec![1.0; 5];
        let mut model =
            GradientBoostingRegressor::new(10, 0.0, TreeConfig::default());
        assert!(model.fit(x.view(), &y).is_err());
    }
}
