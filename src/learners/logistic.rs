//! Multinomial Logistic Regression
//!
//! Softmax regression trained with full-batch gradient descent and optional
//! L2 shrinkage on the non-bias weights.

use anyhow::{bail, Result};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub learning_rate: f64,
    pub max_iter: usize,
    pub l2: f64,
    n_classes: usize,
    /// Per-class weight rows: bias at index 0, then one weight per feature
    weights: Vec<Vec<f64>>,
}

impl LogisticRegression {
    pub fn new(learning_rate: f64, max_iter: usize, l2: f64) -> Self {
        LogisticRegression {
            learning_rate,
            max_iter,
            l2,
            n_classes: 0,
            weights: Vec::new(),
        }
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: &[usize], n_classes: usize) -> Result<()> {
        let n = x.nrows();
        let d = x.ncols();
        if n == 0 {
            bail!("Cannot fit logistic regression on an empty dataset");
        }
        if n_classes < 2 {
            bail!("Logistic regression requires at least two classes");
        }
        if self.max_iter == 0 {
            bail!("max_iter must be at least 1");
        }

        let n_f = n as f64;
        let mut weights = vec![vec![0.0; d + 1]; n_classes];

        for _ in 0..self.max_iter {
            let mut gradients = vec![vec![0.0; d + 1]; n_classes];

            for row in 0..n {
                let features: Vec<f64> = x.row(row).to_vec();
                let probs = softmax_scores(&weights, &features);
                for class in 0..n_classes {
                    let error = probs[class] - f64::from(u8::from(y[row] == class));
                    gradients[class][0] += error;
                    for j in 0..d {
                        gradients[class][j + 1] += error * features[j];
                    }
                }
            }

            for class in 0..n_classes {
                for j in 0..=d {
                    let mut g = gradients[class][j] / n_f;
                    if j > 0 {
                        g += self.l2 * weights[class][j];
                    }
                    weights[class][j] -= self.learning_rate * g;
                }
            }
        }

        self.weights = weights;
        self.n_classes = n_classes;
        Ok(())
    }

    pub fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>> {
        if self.weights.is_empty() {
            bail!("Logistic regression is not fitted");
        }
        Ok(softmax_scores(&self.weights, features))
    }
}

/// Numerically stable softmax over per-class linear scores
fn softmax_scores(weights: &[Vec<f64>], features: &[f64]) -> Vec<f64> {
    let scores: Vec<f64> = weights
        .iter()
        .map(|w| {
            w[0] + w[1..]
                .iter()
                .zip(features)
                .map(|(wi, f)| wi * f)
                .sum::<f64>()
        })
        .collect();
    let max_score = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max_score).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}
