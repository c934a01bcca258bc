//! Random Forests
//!
//! Bagged CART trees with per-split feature subsampling (√d candidates).
//! Trees grow in parallel with deterministic per-tree seeds, so a forest is
//! reproducible for a fixed seed regardless of thread scheduling.

use super::tree::{
    grow_classification, grow_regression, normalize_gains, FeatureSampling, Tree, TreeConfig,
};
use anyhow::{bail, Result};
use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

fn bootstrap_indices(n: usize, rng: &mut StdRng) -> Vec<usize> {
    (0..n).map(|_| rng.gen_range(0..n)).collect()
}

fn subsample_count(n_features: usize) -> usize {
    (n_features as f64).sqrt().round().max(1.0) as usize
}

/// Bagged regression forest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    pub n_trees: usize,
    pub config: TreeConfig,
    pub seed: u64,
    trees: Vec<Tree>,
    n_features: usize,
}

impl RandomForestRegressor {
    pub fn new(n_trees: usize, config: TreeConfig, seed: u64) -> Self {
        RandomForestRegressor {
            n_trees,
            config,
            seed,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: &[f64]) -> Result<()> {
        if self.n_trees == 0 {
            bail!("Random forest requires at least one tree");
        }
        if x.nrows() == 0 {
            bail!("Cannot fit random forest on an empty dataset");
        }
        let n = x.nrows();
        let max_features = subsample_count(x.ncols());

        let trees: Result<Vec<Tree>> = (0..self.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(t as u64));
                let indices = bootstrap_indices(n, &mut rng);
                grow_regression(
                    x,
                    y,
                    &indices,
                    &self.config,
                    Some(FeatureSampling {
                        count: max_features,
                        rng: &mut rng,
                    }),
                )
            })
            .collect();

        self.trees = trees?;
        self.n_features = x.ncols();
        Ok(())
    }

    pub fn predict(&self, features: &[f64]) -> Result<f64> {
        if self.trees.is_empty() {
            bail!("Random forest regressor is not fitted");
        }
        let sum: f64 = self
            .trees
            .iter()
            .map(|tree| tree.leaf_value(features)[0])
            .sum();
        Ok(sum / self.trees.len() as f64)
    }

    pub fn feature_importance(&self) -> Option<Vec<f64>> {
        if self.trees.is_empty() {
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

/// Bagged classification forest; probabilities are averaged leaf
/// distributions across trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    pub n_trees: usize,
    pub config: TreeConfig,
    pub seed: u64,
    n_classes: usize,
    trees: Vec<Tree>,
    n_features: usize,
}

impl RandomForestClassifier {
    pub fn new(n_trees: usize, config: TreeConfig, seed: u64) -> Self {
        RandomForestClassifier {
            n_trees,
            config,
            seed,
            n_classes: 0,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: &[usize], n_classes: usize) -> Result<()> {
        if self.n_trees == 0 {
            bail!("Random forest requires at least one tree");
        }
        if x.nrows() == 0 {
            bail!("Cannot fit random forest on an empty dataset");
        }
        let n = x.nrows();
        let max_features = subsample_count(x.ncols());

        let trees: Result<Vec<Tree>> = (0..self.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(t as u64));
                let indices = bootstrap_indices(n, &mut rng);
                grow_classification(
                    x,
                    y,
                    n_classes,
                    &indices,
                    &self.config,
                    Some(FeatureSampling {
                        count: max_features,
                        rng: &mut rng,
                    }),
                )
            })
            .collect();

        self.trees = trees?;
        self.n_classes = n_classes;
        self.n_features = x.ncols();
        Ok(())
    }

    pub fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>> {
        if self.trees.is_empty() {
            bail!("Random forest classifier is not fitted");
        }
        let mut probs = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (i, p) in tree.leaf_value(features).iter().enumerate() {
                probs[i] += p;
            }
        }
        let k = self.trees.len() as f64;
        for p in probs.iter_mut() {
            *p /= k;
        }
        Ok(probs)
    }

    pub fn feature_importance(&self) -> Option<Vec<f64>> {
        if self.trees.is_empty() {
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

    fn step_data() -> (Array2<f64>, Vec<f64>) {
        let mut x = Array2::zeros((40, 2));
        let mut y = Vec::with_capacity(40);
        for i in 0..40 {
            x[[i, 0]] = i as f64;
            x[[i, 1]] = (i % 7) as f64;
            y.push(if i < 20 { 1.0 } else { 4.0 });
        }
        (x, y)
    }

    #[test]
    fn test_forest_is_deterministic_for_fixed_seed() {
        let (x, y) = step_data();
        let mut a = RandomForestRegressor::new(10, TreeConfig::default(), 42);
        let mut b = RandomForestRegressor::new(10, TreeConfig::default(), 42);
        a.fit(x.view(), &y).unwrap();
        b.fit(x.view(), &y).unwrap();
        assert_eq!(
            a.predict(&[5.0, 3.0]).unwrap(),
            b.predict(&[5.0, 3.0]).unwrap()
        );
    }

    #[test]
    fn test_forest_learns_step() {
        let (x, y) = step_data();
        let mut model = RandomForestRegressor::new(20, TreeConfig::default(), 42);
        model.fit(x.view(), &y).unwrap();
        assert!(model.predict(&[3.0, 1.0]).unwrap() < 2.5);
        assert!(model.predict(&[35.0, 1.0]).unwrap() > 2.5);
    }

    #[test]
    fn test_zero_trees_fails_fit() {
        let (x, y) = step_data();
        let mut model = RandomForestRegressor::new(0, TreeConfig::default(), 42);
        assert!(model.fit(x.view(), &y).is_err());
    }

    #[test]
    fn test_classifier_probabilities_sum_to_one() {
        let (x, _) = step_data();
        let labels: Vec<usize> = (0..40).map(|i| usize::from(i >= 20)).collect();
        let mut model = RandomForestClassifier::new(15, TreeConfig::default(), 7);
        model.fit(x.view(), &labels, 2).unwrap();
        let probs = model.predict_proba(&[3.0, 1.0]).unwrap();
        let total: f64 = probs.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(probs[0] > probs[1]);
    }
}
