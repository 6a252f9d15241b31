//! Voting ensemble

use crate::error::{MetaMlError, Result};
use crate::estimators::{majority_label, unknown_parameter, Estimator};
use crate::mode::Mode;
use crate::params::ParamValue;
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Combines member predictions: a hard vote for classification (ties go to
/// the smallest label) and the mean for regression
#[derive(Debug)]
pub struct VotingEnsemble {
    mode: Mode,
    members: Vec<Box<dyn Estimator>>,
    fitted: bool,
}

impl VotingEnsemble {
    pub fn new(mode: Mode, members: Vec<Box<dyn Estimator>>) -> Result<Self> {
        if members.is_empty() {
            return Err(MetaMlError::ValidationError(
                "No models provided".to_string(),
            ));
        }
        Ok(Self {
            mode,
            members,
            fitted: false,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn members(&self) -> &[Box<dyn Estimator>] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Combine per-member predictions of equal length
    pub fn combine(&self, predictions: &[Array1<f64>]) -> Result<Array1<f64>> {
        if predictions.is_empty() {
            return Err(MetaMlError::ValidationError(
                "No predictions provided".to_string(),
            ));
        }
        let n_samples = predictions[0].len();
        if predictions.iter().any(|p| p.len() != n_samples) {
            return Err(MetaMlError::ShapeError {
                expected: format!("{} predictions per member", n_samples),
                actual: "members disagree on prediction length".to_string(),
            });
        }
        let n_members = predictions.len() as f64;

        let result = match self.mode {
            Mode::Classification => Array1::from_shape_fn(n_samples, |i| {
                let mut votes: BTreeMap<i64, f64> = BTreeMap::new();
                for pred in predictions {
                    *votes.entry(pred[i].round() as i64).or_insert(0.0) += 1.0;
                }
                majority_label(&votes)
            }),
            Mode::Regression => Array1::from_shape_fn(n_samples, |i| {
                predictions.iter().map(|pred| pred[i]).sum::<f64>() / n_members
            }),
        };
        Ok(result)
    }
}

impl Estimator for VotingEnsemble {
    fn name(&self) -> &str {
        "VotingEnsemble"
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        Err(unknown_parameter(self.name(), name, value))
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.members
            .par_iter_mut()
            .map(|m| m.fit(x, y))
            .collect::<Result<Vec<()>>>()?;
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.fitted {
            return Err(MetaMlError::ModelNotFitted);
        }
        let predictions = self
            .members
            .iter()
            .map(|m| m.predict(x))
            .collect::<Result<Vec<_>>>()?;
        self.combine(&predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::{DecisionTree, GaussianNB, KNeighbors, LinearRegression};
    use ndarray::array;

    fn classifier_ensemble() -> VotingEnsemble {
        VotingEnsemble::new(
            Mode::Classification,
            vec![
                Box::new(KNeighbors::classifier()),
                Box::new(GaussianNB::new()),
                Box::new(DecisionTree::classifier()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_hard_vote_tie_goes_to_smallest_label() {
        let ensemble = VotingEnsemble::new(
            Mode::Classification,
            vec![Box::new(GaussianNB::new()), Box::new(GaussianNB::new())],
        )
        .unwrap();
        let out = ensemble.combine(&[array![2.0, 1.0], array![1.0, 1.0]]).unwrap();
        assert_eq!(out, array![1.0, 1.0]);
    }

    #[test]
    fn test_majority_wins() {
        let ensemble = classifier_ensemble();
        let out = ensemble
            .combine(&[array![0.0, 1.0], array![1.0, 1.0], array![1.0, 0.0]])
            .unwrap();
        assert_eq!(out, array![1.0, 1.0]);
    }

    #[test]
    fn test_mean_for_regression() {
        let ensemble = VotingEnsemble::new(
            Mode::Regression,
            vec![Box::new(LinearRegression::new()), Box::new(LinearRegression::new())],
        )
        .unwrap();
        let out = ensemble.combine(&[array![4.0, 1.0], array![8.0, 2.0]]).unwrap();
        assert!((out[0] - 6.0).abs() < 1e-12);
        assert!((out[1] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_fit_predict() {
        let x = Array2::from_shape_fn((20, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(20, |i| if i < 10 { 0.0 } else { 1.0 });
        let mut ensemble = classifier_ensemble();
        assert!(matches!(ensemble.predict(&x), Err(MetaMlError::ModelNotFitted)));
        ensemble.fit(&x, &y).unwrap();
        let pred = ensemble.predict(&array![[1.0], [18.0]]).unwrap();
        assert_eq!(pred, array![0.0, 1.0]);
    }

    #[test]
    fn test_rejects_empty_and_ragged_predictions() {
        assert!(VotingEnsemble::new(Mode::Classification, vec![]).is_err());
        let ensemble = classifier_ensemble();
        assert!(ensemble.combine(&[]).is_err());
        assert!(matches!(
            ensemble.combine(&[array![1.0, 0.0], array![1.0]]),
            Err(MetaMlError::ShapeError { .. })
        ));
    }
}
