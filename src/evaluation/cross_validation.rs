//! K-fold splitters

use crate::error::{MetaMlError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cross-validation strategy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CVStrategy {
    /// Contiguous folds
    KFold { n_splits: usize },
    /// Folds preserving the class distribution of the target
    StratifiedKFold { n_splits: usize },
}

impl CVStrategy {
    pub fn n_splits(&self) -> usize {
        match *self {
            CVStrategy::KFold { n_splits } | CVStrategy::StratifiedKFold { n_splits } => n_splits,
        }
    }
}

/// A single train/test split
#[derive(Debug, Clone, PartialEq)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter. Folds depend only on the target, never on a
/// seed, so every candidate of a run is scored on the same splits.
#[derive(Debug, Clone)]
pub struct CrossValidator {
    strategy: CVStrategy,
}

impl CrossValidator {
    pub fn new(strategy: CVStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> CVStrategy {
        self.strategy
    }

    /// Generate train/test splits over `y.len()` samples
    pub fn split(&self, y: &Array1<f64>) -> Result<Vec<CVSplit>> {
        let n_samples = y.len();
        let n_splits = self.strategy.n_splits();
        if n_splits < 2 {
            return Err(MetaMlError::ValidationError("n_splits must be at least 2".to_string()));
        }
        if n_samples < n_splits {
            return Err(MetaMlError::ValidationError(format!(
                "n_samples ({}) must be >= n_splits ({})",
                n_samples, n_splits
            )));
        }

        let folds = match self.strategy {
            CVStrategy::KFold { .. } => Self::k_fold(n_samples, n_splits),
            CVStrategy::StratifiedKFold { .. } => Self::stratified_k_fold(y, n_splits),
        };
        Ok(Self::splits_from_folds(&folds))
    }

    fn k_fold(n_samples: usize, n_splits: usize) -> Vec<Vec<usize>> {
        let base = n_samples / n_splits;
        let remainder = n_samples % n_splits;
        let mut folds = Vec::with_capacity(n_splits);
        let mut current = 0;
        for fold_idx in 0..n_splits {
            let size = if fold_idx < remainder { base + 1 } else { base };
            folds.push((current..current + size).collect());
            current += size;
        }
        folds
    }

    /// Deal each class's samples round-robin across folds, continuing the
    /// rotation from one class to the next so fold sizes stay balanced
    fn stratified_k_fold(y: &Array1<f64>, n_splits: usize) -> Vec<Vec<usize>> {
        let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (idx, &v) in y.iter().enumerate() {
            by_class.entry(v.round() as i64).or_default().push(idx);
        }

        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        let mut slot = 0;
        for indices in by_class.values() {
            for &idx in indices {
                folds[slot % n_splits].push(idx);
                slot += 1;
            }
        }
        for fold in &mut folds {
            fold.sort_unstable();
        }
        folds
    }

    fn splits_from_folds(folds: &[Vec<usize>]) -> Vec<CVSplit> {
        (0..folds.len())
            .map(|fold_idx| {
                let mut train_indices: Vec<usize> = folds
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != fold_idx)
                    .flat_map(|(_, f)| f.iter().copied())
                    .collect();
                train_indices.sort_unstable();
                CVSplit {
                    train_indices,
                    test_indices: folds[fold_idx].clone(),
                    fold_idx,
                }
            })
            .collect()
    }
}

/// Per-fold scores and their summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    pub scores: Vec<f64>,
    pub mean_score: f64,
    pub std_score: f64,
    pub n_folds: usize,
}

impl CVResults {
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        let mean_score = scores.iter().sum::<f64>() / n_folds as f64;
        let variance = scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n_folds as f64;
        Self {
            scores,
            mean_score,
            std_score: variance.sqrt(),
            n_folds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k_fold_covers_every_sample_once() {
        let y = Array1::zeros(23);
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 5 });
        let splits = cv.split(&y).unwrap();

        assert_eq!(splits.len(), 5);
        assert_eq!(splits[0].test_indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(splits[4].test_indices.len(), 4);

        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..23).collect::<Vec<_>>());
        for s in &splits {
            assert_eq!(s.train_indices.len() + s.test_indices.len(), 23);
        }
    }

    #[test]
    fn test_stratified_k_fold_balances_classes() {
        let y = Array1::from_vec(vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 5 });
        let splits = cv.split(&y).unwrap();

        for split in &splits {
            assert_eq!(split.test_indices.len(), 2);
            let ones = split.test_indices.iter().filter(|&&i| y[i] == 1.0).count();
            assert_eq!(ones, 1);
        }
    }

    #[test]
    fn test_stratified_small_classes_leave_no_empty_fold() {
        let y = Array1::from_vec(vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 5 });
        let splits = cv.split(&y).unwrap();
        assert!(splits.iter().all(|s| !s.test_indices.is_empty()));
    }

    #[test]
    fn test_too_few_samples() {
        let y = Array1::zeros(3);
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 10 });
        assert!(matches!(cv.split(&y), Err(MetaMlError::ValidationError(_))));
    }

    #[test]
    fn test_cv_results_summary() {
        let r = CVResults::from_scores(vec![0.5, 1.0]);
        assert_eq!(r.mean_score, 0.75);
        assert_eq!(r.std_score, 0.25);
        assert_eq!(r.n_folds, 2);
    }
}
