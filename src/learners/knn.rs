//! K-Nearest-Neighbour Learners
//!
//! Brute-force Euclidean neighbours over the stored training set. Small
//! datasets keep this exact and fast enough; no index structure is built.

use anyhow::{bail, Result};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Indices of the k nearest stored rows to the query point
fn nearest(rows: &[Vec<f64>], query: &[f64], k: usize) -> Vec<usize> {
    let mut scored: Vec<(f64, usize)> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| (squared_distance(row, query), i))
        .collect();
    scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(k).map(|(_, i)| i).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnRegressor {
    pub k: usize,
    rows: Vec<Vec<f64>>,
    targets: Vec<f64>,
}

impl KnnRegressor {
    pub fn new(k: usize) -> Self {
        KnnRegressor {
            k,
            rows: Vec::new(),
            targets: Vec::new(),
        }
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: &[f64]) -> Result<()> {
        if self.k == 0 {
            bail!("k must be at least 1");
        }
        if x.nrows() < self.k {
            bail!("k={} exceeds the {} training rows", self.k, x.nrows());
        }
        self.rows = (0..x.nrows()).map(|i| x.row(i).to_vec()).collect();
        self.targets = y.to_vec();
        Ok(())
    }

    pub fn predict(&self, features: &[f64]) -> Result<f64> {
        if self.rows.is_empty() {
            bail!("KNN regressor is not fitted");
        }
        let neighbours = nearest(&self.rows, features, self.k);
        let sum: f64 = neighbours.iter().map(|&i| self.targets[i]).sum();
        Ok(sum / neighbours.len() as f64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnClassifier {
    pub k: usize,
    n_classes: usize,
    rows: Vec<Vec<f64>>,
    labels: Vec<usize>,
}

impl KnnClassifier {
    pub fn new(k: usize) -> Self {
        KnnClassifier {
            k,
            n_classes: 0,
            rows: Vec::new(),
            labels: Vec::new(),
        }
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: &[usize], n_classes: usize) -> Result<()> {
        if self.k == 0 {
            bail!("k must be at least 1");
        }
        if x.nrows() < self.k {
            bail!("k={} exceeds the {} training rows", self.k, x.nrows());
        }
        self.rows = (0..x.nrows()).map(|i| x.row(i).to_vec()).collect();
        self.labels = y.to_vec();
        self.n_classes = n_classes;
        Ok(())
    }

    /// Neighbour vote shares per class
    pub fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>> {
        if self.rows.is_empty() {
            bail!("KNN classifier is not fitted");
        }
        let neighbours = nearest(&self.rows, features, self.k);
        let mut votes = vec![0.0; self.n_classes];
        for &i in &neighbours {
            votes[self.labels[i]] += 1.0;
        }
        let k = neighbours.len() as f64;
        for v in votes.iter_mut() {
            *v /= k;
        }
        Ok(votes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_knn_regressor_averages_neighbours() {
        let x = array![[0.0], [1.0], [10.0], [11.0]];
        let y = [1.0, 2.0, 10.0, 12.0];
        let mut model = KnnRegressor::new(2);
        model.fit(x.view(), &y).unwrap();
        assert_relative_eq!(model.predict(&[0.4]).unwrap(), 1.5, epsilon = 1e-12);
        assert_relative_eq!(model.predict(&[10.6]).unwrap(), 11.0, epsilon = 1e-12);
    }

    #[test]
    fn test_knn_classifier_votes() {
        let x = array![[0.0], [1.0], [2.0], [10.0], [11.0]];
        let y = [0usize, 0, 0, 1, 1];
        let mut model = KnnClassifier::new(3);
        model.fit(x.view(), &y, 2).unwrap();
        let probs = model.predict_proba(&[1.0]).unwrap();
        assert_relative_eq!(probs[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_oversized_k_rejected() {
        let x = array![[0.0], [1.0]];
        let y = [1.0, 2.0];
        let mut model = KnnRegressor::new(5);
        assert!(model.fit(x.view(), &y).is_err());
    }
}
