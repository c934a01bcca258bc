//! Decision Trees (CART)
//!
//! Variance-reduction splits for regression, Gini splits for classification.
//! One flat node arena serves both tasks; leaves carry either a single mean
//! value (regression) or a class-probability distribution (classification).
//! Split-gain totals per feature back the feature-importance capability.

use anyhow::{bail, Result};
use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use serde::{Deserialize, Serialize};

/// Structural limits shared by every tree-based learner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        TreeConfig {
            max_depth: 10,
            min_samples_split: 5,
            min_samples_leaf: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    /// Regression: [mean]. Classification: per-class probabilities.
    Leaf { value: Vec<f64> },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A grown tree: flat node arena (root at 0) plus accumulated split gains
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
    gains: Vec<f64>,
}

impl Tree {
    /// Walk from the root to a leaf for one feature vector
    pub fn leaf_value(&self, features: &[f64]) -> &[f64] {
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    at = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Raw (unnormalized) per-feature split gains
    pub fn gains(&self) -> &[f64] {
        &self.gains
    }
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Feature subsampling control for forests: draw `count` candidate features
/// per split from the given rng. `None` considers every feature.
pub struct FeatureSampling<'a> {
    pub count: usize,
    pub rng: &'a mut StdRng,
}

fn candidate_features(
    n_features: usize,
    sampling: &mut Option<FeatureSampling<'_>>,
) -> Vec<usize> {
    match sampling {
        Some(fs) if fs.count < n_features => {
            sample(fs.rng, n_features, fs.count).into_vec()
        }
        _ => (0..n_features).collect(),
    }
}

// ---------------------------------------------------------------------------
// Regression growth
// ---------------------------------------------------------------------------

/// Grow a regression tree on the given sample indices
pub fn grow_regression(
    x: ArrayView2<f64>,
    y: &[f64],
    indices: &[usize],
    config: &TreeConfig,
    mut sampling: Option<FeatureSampling<'_>>,
) -> Result<Tree> {
    if indices.is_empty() {
        bail!("Cannot grow a tree on zero samples");
    }
    let mut tree = Tree {
        nodes: Vec::new(),
        gains: vec![0.0; x.ncols()],
    };
    grow_regression_node(x, y, indices, config, &mut sampling, &mut tree, 0)?;
    Ok(tree)
}

fn grow_regression_node(
    x: ArrayView2<f64>,
    y: &[f64],
    indices: &[usize],
    config: &TreeConfig,
    sampling: &mut Option<FeatureSampling<'_>>,
    tree: &mut Tree,
    depth: usize,
) -> Result<usize> {
    let n = indices.len();
    let sum: f64 = indices.iter().map(|&i| y[i]).sum();
    let mean = sum / n as f64;
    let ss: f64 = indices.iter().map(|&i| (y[i] - mean) * (y[i] - mean)).sum();

    let make_leaf = |tree: &mut Tree| {
        tree.nodes.push(Node::Leaf { value: vec![mean] });
        tree.nodes.len() - 1
    };

    if depth >= config.max_depth || n < config.min_samples_split || ss <= 1e-12 {
        return Ok(make_leaf(tree));
    }

    let mut best: Option<BestSplit> = None;
    for feature in candidate_features(x.ncols(), sampling) {
        let mut pairs: Vec<(f64, f64)> =
            indices.iter().map(|&i| (x[[i, feature]], y[i])).collect();
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        // Prefix sums over the sorted order let each candidate threshold be
        // scored in O(1)
        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        let total_sq: f64 = pairs.iter().map(|(_, v)| v * v).sum();

        for split_at in 1..n {
            left_sum += pairs[split_at - 1].1;
            left_sq += pairs[split_at - 1].1 * pairs[split_at - 1].1;

            if pairs[split_at].0 <= pairs[split_at - 1].0 {
                continue; // identical values cannot separate
            }
            let n_left = split_at;
            let n_right = n - split_at;
            if n_left < config.min_samples_leaf || n_right < config.min_samples_leaf {
                continue;
            }

            let right_sum = sum - left_sum;
            let right_sq = total_sq - left_sq;
            let ss_left = left_sq - left_sum * left_sum / n_left as f64;
            let ss_right = right_sq - right_sum * right_sum / n_right as f64;
            let gain = ss - ss_left - ss_right;

            if gain > best.as_ref().map_or(1e-12, |b| b.gain) {
                best = Some(BestSplit {
                    feature,
                    threshold: (pairs[split_at - 1].0 + pairs[split_at].0) / 2.0,
                    gain,
                });
            }
        }
    }

    let Some(split) = best else {
        return Ok(make_leaf(tree));
    };

    let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .copied()
        .partition(|&i| x[[i, split.feature]] <= split.threshold);

    tree.gains[split.feature] += split.gain;
    let node_at = tree.nodes.len();
    tree.nodes.push(Node::Split {
        feature: split.feature,
        threshold: split.threshold,
        left: 0,
        right: 0,
    });
    let left = grow_regression_node(x, y, &left_idx, config, sampling, tree, depth + 1)?;
    let right = grow_regression_node(x, y, &right_idx, config, sampling, tree, depth + 1)?;
    if let Node::Split {
        left: l, right: r, ..
    } = &mut tree.nodes[node_at]
    {
        *l = left;
        *r = right;
    }
    Ok(node_at)
}

// ---------------------------------------------------------------------------
// Classification growth
// ---------------------------------------------------------------------------

/// Grow a classification tree on the given sample indices
pub fn grow_classification(
    x: ArrayView2<f64>,
    y: &[usize],
    n_classes: usize,
    indices: &[usize],
    config: &TreeConfig,
    mut sampling: Option<FeatureSampling<'_>>,
) -> Result<Tree> {
    if indices.is_empty() {
        bail!("Cannot grow a tree on zero samples");
    }
    if n_classes < 2 {
        bail!("Classification requires at least two classes, got {}", n_classes);
    }
    let mut tree = Tree {
        nodes: Vec::new(),
        gains: vec![0.0; x.ncols()],
    };
    grow_classification_node(x, y, n_classes, indices, config, &mut sampling, &mut tree, 0)?;
    Ok(tree)
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let t = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / t;
            p * p
        })
        .sum::<f64>()
}

#[allow(clippy::too_many_arguments)]
fn grow_classification_node(
    x: ArrayView2<f64>,
    y: &[usize],
    n_classes: usize,
    indices: &[usize],
    config: &TreeConfig,
    sampling: &mut Option<FeatureSampling<'_>>,
    tree: &mut Tree,
    depth: usize,
) -> Result<usize> {
    let n = indices.len();
    let mut counts = vec![0usize; n_classes];
    for &i in indices {
        counts[y[i]] += 1;
    }
    let node_gini = gini(&counts, n);

    let make_leaf = |tree: &mut Tree| {
        let distribution: Vec<f64> =
            counts.iter().map(|&c| c as f64 / n as f64).collect();
        tree.nodes.push(Node::Leaf {
            value: distribution,
        });
        tree.nodes.len() - 1
    };

    if depth >= config.max_depth || n < config.min_samples_split || node_gini <= 1e-12 {
        return Ok(make_leaf(tree));
    }

    let mut best: Option<BestSplit> = None;
    for feature in candidate_features(x.ncols(), sampling) {
        let mut pairs: Vec<(f64, usize)> =
            indices.iter().map(|&i| (x[[i, feature]], y[i])).collect();
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut left_counts = vec![0usize; n_classes];
        for split_at in 1..n {
            left_counts[pairs[split_at - 1].1] += 1;

            if pairs[split_at].0 <= pairs[split_at - 1].0 {
                continue;
            }
            let n_left = split_at;
            let n_right = n - split_at;
            if n_left < config.min_samples_leaf || n_right < config.min_samples_leaf {
                continue;
            }

            let right_counts: Vec<usize> = counts
                .iter()
                .zip(&left_counts)
                .map(|(total, l)| total - l)
                .collect();
            let weighted = n_left as f64 * gini(&left_counts, n_left)
                + n_right as f64 * gini(&right_counts, n_right);
            let gain = n as f64 * node_gini - weighted;

            if gain > best.as_ref().map_or(1e-12, |b| b.gain) {
                best = Some(BestSplit {
                    feature,
                    threshold: (pairs[split_at - 1].0 + pairs[split_at].0) / 2.0,
                    gain,
                });
            }
        }
    }

    let Some(split) = best else {
        return Ok(make_leaf(tree));
    };

    let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .copied()
        .partition(|&i| x[[i, split.feature]] <= split.threshold);

    tree.gains[split.feature] += split.gain;
    let node_at = tree.nodes.len();
    tree.nodes.push(Node::Split {
        feature: split.feature,
        threshold: split.threshold,
        left: 0,
        right: 0,
    });
    let left = grow_classification_node(
        x, y, n_classes, &left_idx, config, sampling, tree, depth + 1,
    )?;
    let right = grow_classification_node(
        x, y, n_classes, &right_idx, config, sampling, tree, depth + 1,
    )?;
    if let Node::Split {
        left: l, right: r, ..
    } = &mut tree.nodes[node_at]
    {
        *l = left;
        *r = right;
    }
    Ok(node_at)
}

// ---------------------------------------------------------------------------
// Learner wrappers
// ---------------------------------------------------------------------------

/// Single CART regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeRegressor {
    pub config: TreeConfig,
    tree: Option<Tree>,
}

impl DecisionTreeRegressor {
    pub fn new(config: TreeConfig) -> Self {
        DecisionTreeRegressor { config, tree: None }
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: &[f64]) -> Result<()> {
        let indices: Vec<usize> = (0..x.nrows()).collect();
        self.tree = Some(grow_regression(x, y, &indices, &self.config, None)?);
        Ok(())
    }

    pub fn predict(&self, features: &[f64]) -> Result<f64> {
        match &self.tree {
            Some(tree) => Ok(tree.leaf_value(features)[0]),
            None => bail!("Decision tree regressor is not fitted"),
        }
    }

    pub fn feature_importance(&self) -> Option<Vec<f64>> {
        self.tree.as_ref().map(|t| normalize_gains(t.gains()))
    }
}

/// Single CART classifier with leaf class distributions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeClassifier {
    pub config: TreeConfig,
    n_classes: usize,
    tree: Option<Tree>,
}

impl DecisionTreeClassifier {
    pub fn new(config: TreeConfig) -> Self {
        DecisionTreeClassifier {
            config,
            n_classes: 0,
            tree: None,
        }
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: &[usize], n_classes: usize) -> Result<()> {
        let indices: Vec<usize> = (0..x.nrows()).collect();
        self.tree = Some(grow_classification(
            x, y, n_classes, &indices, &self.config, None,
        )?);
        self.n_classes = n_classes;
        Ok(())
    }

    pub fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>> {
        match &self.tree {
            Some(tree) => Ok(tree.leaf_value(features).to_vec()),
            None => bail!("Decision tree classifier is not fitted"),
        }
    }

    pub fn feature_importance(&self) -> Option<Vec<f64>> {
        self.tree.as_ref().map(|t| normalize_gains(t.gains()))
    }
}

/// Normalize accumulated gains to sum to 1 (all-zero stays all-zero)
pub fn normalize_gains(gains: &[f64]) -> Vec<f64> {
    let total: f64 = gains.iter().sum();
    if total <= 0.0 {
        return gains.to_vec();
    }
    gains.iter().map(|g| g / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_regression_tree_splits_step_function() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let y = [0.0, 0.0, 0.0, 5.0, 5.0, 5.0];
        let mut model = DecisionTreeRegressor::new(TreeConfig {
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
        });
        model.fit(x.view(), &y).unwrap();
        assert_relative_eq!(model.predict(&[2.0]).unwrap(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(model.predict(&[11.0]).unwrap(), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_classification_tree_distribution() {
        let x = array![[0.0], [1.0], [2.0], [10.0], [11.0], [12.0]];
        let y = [0usize, 0, 0, 1, 1, 1];
        let mut model = DecisionTreeClassifier::new(TreeConfig {
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
        });
        model.fit(x.view(), &y, 2).unwrap();
        let proba = model.predict_proba(&[0.5]).unwrap();
        assert_relative_eq!(proba[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(proba[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_importance_concentrates_on_informative_feature() {
        // Feature 0 decides the target, feature 1 is constant
        let x = array![
            [1.0, 7.0],
            [2.0, 7.0],
            [3.0, 7.0],
            [10.0, 7.0],
            [11.0, 7.0],
            [12.0, 7.0]
        ];
        let y = [0.0, 0.0, 0.0, 5.0, 5.0, 5.0];
        let mut model = DecisionTreeRegressor::new(TreeConfig {
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
        });
        model.fit(x.view(), &y).unwrap();
        let importance = model.feature_importance().unwrap();
        assert_relative_eq!(importance[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(importance[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_min_samples_leaf_respected() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = [1.0, 2.0, 3.0, 4.0];
        let mut model = DecisionTreeRegressor::new(TreeConfig {
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 2,
        });
        model.fit(x.view(), &y).unwrap();
        // Any split leaves at least 2 rows per side, so leaves are 2-row means
        let p = model.predict(&[1.0]).unwrap();
        assert_relative_eq!(p, 1.5, epsilon = 1e-12);
    }
}
