//! Data Splitting
//!
//! Seeded shuffling, train/test splits, and k-fold partitioning used by
//! training, cross-validation, and grid search. Every split takes an explicit
//! seed so runs are reproducible.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Shuffled train/test index split
pub fn train_test_split_indices(
    n: usize,
    test_size: f64,
    seed: u64,
) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = ((n as f64) * test_size).round() as usize;
    let n_test = n_test.min(n);
    let test = indices[..n_test].to_vec();
    let train = indices[n_test..].to_vec();
    (train, test)
}

/// Shuffled k-fold partition: k (train_indices, val_indices) pairs.
///
/// Folds differ in size by at most one row. k is clamped to n so tiny
/// datasets still produce usable folds.
pub fn kfold_indices(n: usize, k: usize, seed: u64) -> Vec<(Vec<usize>, Vec<usize>)> {
    let k = k.max(2).min(n.max(2));
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let base = n / k;
    let remainder = n % k;
    let mut folds = Vec::with_capacity(k);
    let mut start = 0;
    for fold in 0..k {
        let size = base + usize::from(fold < remainder);
        let val: Vec<usize> = indices[start..start + size].to_vec();
        let train: Vec<usize> = indices[..start]
            .iter()
            .chain(&indices[start + size..])
            .copied()
            .collect();
        folds.push((train, val));
        start += size;
    }
    folds
}

/// Materialize the selected rows of a matrix
pub fn take_rows(x: ArrayView2<f64>, indices: &[usize]) -> Array2<f64> {
    let n_features = x.ncols();
    let mut out = Array2::zeros((indices.len(), n_features));
    for (row, &idx) in indices.iter().enumerate() {
        for col in 0..n_features {
            out[[row, col]] = x[[idx, col]];
        }
    }
    out
}

/// Materialize the selected elements of a vector
pub fn take_values(y: ArrayView1<f64>, indices: &[usize]) -> Array1<f64> {
    Array1::from_iter(indices.iter().map(|&i| y[i]))
}

/// Materialize the selected elements of a label slice
pub fn take_labels(y: &[usize], indices: &[usize]) -> Vec<usize> {
    indices.iter().map(|&i| y[i]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_is_deterministic() {
        let (train_a, test_a) = train_test_split_indices(100, 0.2, 42);
        let (train_b, test_b) = train_test_split_indices(100, 0.2, 42);
        assert_eq!(train_a, train_b);
        assert_eq!(test_a, test_b);
        assert_eq!(test_a.len(), 20);
        assert_eq!(train_a.len(), 80);
    }

    #[test]
    fn test_kfold_covers_every_row_once() {
        let folds = kfold_indices(23, 5, 42);
        assert_eq!(folds.len(), 5);
        let mut seen: Vec<usize> = folds.iter().flat_map(|(_, val)| val.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..23).collect::<Vec<_>>());
        for (train, val) in &folds {
            assert_eq!(train.len() + val.len(), 23);
        }
    }

    #[test]
    fn test_kfold_clamps_k_to_n() {
        let folds = kfold_indices(3, 5, 7);
        assert_eq!(folds.len(), 3);
    }
}
