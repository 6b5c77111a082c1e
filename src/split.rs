//! Stratified splitting: train/test partition and k-fold assignment

use crate::dataset::Dataset;
use crate::error::{OncoTreeError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// A stratified train/test partition of a dataset.
///
/// `train` and `test` are disjoint, their union covers every input row,
/// and each class's share in both halves matches the original to within
/// one row (rounding).
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub train: Dataset,
    pub test: Dataset,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

fn indices_by_class(dataset: &Dataset) -> Vec<Vec<usize>> {
    let mut by_class = vec![Vec::new(); dataset.n_classes()];
    for (idx, &label) in dataset.labels().iter().enumerate() {
        by_class[label].push(idx);
    }
    by_class
}

/// Partition a dataset into stratified train/test subsets.
///
/// Within each class the row indices are shuffled with a ChaCha8 stream
/// seeded from `seed`, then the first `round(train_fraction * class_size)`
/// go to train and the rest to test. The take is clamped so both halves
/// see at least one row of every class. Deterministic for a given seed.
pub fn train_test_split(
    dataset: &Dataset,
    train_fraction: f64,
    seed: u64,
) -> Result<TrainTestSplit> {
    if !(train_fraction > 0.0 && train_fraction < 1.0) {
        return Err(OncoTreeError::invalid_parameter(
            "train_fraction",
            train_fraction,
            "must be in (0, 1)",
        ));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train_indices = Vec::new();
    let mut test_indices = Vec::new();

    for (class, mut indices) in indices_by_class(dataset).into_iter().enumerate() {
        if indices.len() < 2 {
            return Err(OncoTreeError::InsufficientData {
                class,
                count: indices.len(),
                required: 2,
            });
        }
        indices.shuffle(&mut rng);
        let take = (train_fraction * indices.len() as f64).round() as usize;
        let take = take.clamp(1, indices.len() - 1);
        train_indices.extend_from_slice(&indices[..take]);
        test_indices.extend_from_slice(&indices[take..]);
    }

    // Restore original row order within each half so downstream
    // iteration does not depend on class grouping.
    train_indices.sort_unstable();
    test_indices.sort_unstable();

    Ok(TrainTestSplit {
        train: dataset.subset(&train_indices),
        test: dataset.subset(&test_indices),
        train_indices,
        test_indices,
    })
}

/// Assign every row to one of `k` stratified folds.
///
/// Shuffled per-class indices are dealt round-robin across folds, the
/// same discipline as [`train_test_split`] generalized to `k` groups.
/// Returns the row indices of each fold, sorted ascending.
pub fn stratified_folds(dataset: &Dataset, k: usize, seed: u64) -> Result<Vec<Vec<usize>>> {
    if k < 2 {
        return Err(OncoTreeError::invalid_parameter(
            "k",
            k,
            "at least 2 folds required",
        ));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut folds = vec![Vec::new(); k];

    for (class, mut indices) in indices_by_class(dataset).into_iter().enumerate() {
        if indices.len() < k {
            return Err(OncoTreeError::InsufficientData {
                class,
                count: indices.len(),
                required: k,
            });
        }
        indices.shuffle(&mut rng);
        for (i, idx) in indices.into_iter().enumerate() {
            folds[i % k].push(idx);
        }
    }

    for fold in &mut folds {
        fold.sort_unstable();
    }
    Ok(folds)
}

/// All row indices outside `fold`, i.e. the training rows for that fold.
pub fn fold_train_indices(folds: &[Vec<usize>], fold: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = folds
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != fold)
        .flat_map(|(_, f)| f.iter().copied())
        .collect();
    indices.sort_unstable();
    indices
}
