//! Scoring functions and their knowledgebase metric keys

use crate::error::{MetaMlError, Result};
use crate::mode::Mode;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A greater-is-better scoring function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scorer {
    Accuracy,
    BalancedAccuracy,
    F1Macro,
    R2,
    ExplainedVariance,
    NegMeanSquaredError,
}

impl Scorer {
    /// Resolve a scorer name; `f1` is accepted as an alias of `f1_macro`
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "accuracy" => Ok(Scorer::Accuracy),
            "balanced_accuracy" => Ok(Scorer::BalancedAccuracy),
            "f1" | "f1_macro" => Ok(Scorer::F1Macro),
            "r2" => Ok(Scorer::R2),
            "explained_variance" => Ok(Scorer::ExplainedVariance),
            "neg_mean_squared_error" => Ok(Scorer::NegMeanSquaredError),
            _ => Err(MetaMlError::ConfigError(format!(
                "scoring '{}' has no knowledgebase metric; supported: accuracy, balanced_accuracy, \
                 f1, f1_macro, r2, explained_variance, neg_mean_squared_error",
                name
            ))),
        }
    }

    /// Resolve a scorer name and check it suits `mode`; `None` picks the mode default
    pub fn resolve(name: Option<&str>, mode: Mode) -> Result<Self> {
        let scorer = match name {
            Some(n) => Self::from_name(n)?,
            None => return Ok(Self::default_for(mode)),
        };
        if scorer.mode() != mode {
            return Err(MetaMlError::ConfigError(format!(
                "scoring '{}' is a {} metric but the run mode is {}",
                scorer.name(),
                scorer.mode(),
                mode
            )));
        }
        Ok(scorer)
    }

    pub fn default_for(mode: Mode) -> Self {
        match mode {
            Mode::Classification => Scorer::Accuracy,
            Mode::Regression => Scorer::NegMeanSquaredError,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scorer::Accuracy => "accuracy",
            Scorer::BalancedAccuracy => "balanced_accuracy",
            Scorer::F1Macro => "f1_macro",
            Scorer::R2 => "r2",
            Scorer::ExplainedVariance => "explained_variance",
            Scorer::NegMeanSquaredError => "neg_mean_squared_error",
        }
    }

    /// Column name the knowledgebase stores this metric under
    pub fn kb_metric_key(&self) -> &'static str {
        match self {
            Scorer::Accuracy => "accuracy",
            Scorer::BalancedAccuracy => "bal_accuracy",
            Scorer::F1Macro => "macrof1",
            Scorer::R2 => "r2_cv_mean",
            Scorer::ExplainedVariance => "explained_variance_cv_mean",
            Scorer::NegMeanSquaredError => "neg_mean_squared_error_cv_mean",
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            Scorer::Accuracy | Scorer::BalancedAccuracy | Scorer::F1Macro => Mode::Classification,
            Scorer::R2 | Scorer::ExplainedVariance | Scorer::NegMeanSquaredError => Mode::Regression,
        }
    }

    pub fn score(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
        if y_true.len() != y_pred.len() {
            return Err(MetaMlError::ShapeError {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", y_pred.len()),
            });
        }
        if y_true.is_empty() {
            return Err(MetaMlError::ValidationError("cannot score zero samples".to_string()));
        }
        Ok(match self {
            Scorer::Accuracy => accuracy(y_true, y_pred),
            Scorer::BalancedAccuracy => balanced_accuracy(y_true, y_pred),
            Scorer::F1Macro => f1_macro(y_true, y_pred),
            Scorer::R2 => r2(y_true, y_pred),
            Scorer::ExplainedVariance => explained_variance(y_true, y_pred),
            Scorer::NegMeanSquaredError => -mean_squared_error(y_true, y_pred),
        })
    }
}

impl fmt::Display for Scorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn label(v: f64) -> i64 {
    v.round() as i64
}

fn accuracy(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| label(**t) == label(**p))
        .count();
    correct as f64 / y_true.len() as f64
}

/// (true positives, predicted positives, actual positives) for one class
fn class_counts(y_true: &Array1<f64>, y_pred: &Array1<f64>, class: i64) -> (f64, f64, f64) {
    let mut tp = 0.0;
    let mut predicted = 0.0;
    let mut actual = 0.0;
    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        let (t, p) = (label(*t), label(*p));
        if p == class {
            predicted += 1.0;
        }
        if t == class {
            actual += 1.0;
            if p == class {
                tp += 1.0;
            }
        }
    }
    (tp, predicted, actual)
}

/// Mean per-class recall over the classes present in `y_true`
fn balanced_accuracy(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let classes: BTreeSet<i64> = y_true.iter().map(|v| label(*v)).collect();
    let recalls: f64 = classes
        .iter()
        .map(|&c| {
            let (tp, _, actual) = class_counts(y_true, y_pred, c);
            tp / actual
        })
        .sum();
    recalls / classes.len() as f64
}

/// Unweighted mean F1 over every label seen in either vector
fn f1_macro(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let classes: BTreeSet<i64> = y_true.iter().chain(y_pred.iter()).map(|v| label(*v)).collect();
    let total: f64 = classes
        .iter()
        .map(|&c| {
            let (tp, predicted, actual) = class_counts(y_true, y_pred, c);
            if predicted + actual == 0.0 {
                0.0
            } else {
                2.0 * tp / (predicted + actual)
            }
        })
        .sum();
    total / classes.len() as f64
}

fn mean_squared_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    (y_true - y_pred).mapv(|d| d * d).mean().unwrap_or(0.0)
}

/// Ratio score with a constant-target convention: 1 for a perfect fit, else 0
fn one_minus_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        if numerator == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - numerator / denominator
    }
}

fn r2(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let mean = y_true.mean().unwrap_or(0.0);
    let ss_res = (y_true - y_pred).mapv(|d| d * d).sum();
    let ss_tot = y_true.mapv(|v| (v - mean).powi(2)).sum();
    one_minus_ratio(ss_res, ss_tot)
}

fn explained_variance(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let residual = y_true - y_pred;
    one_minus_ratio(residual.var(0.0), y_true.var(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_metric_keys() {
        assert_eq!(Scorer::from_name("accuracy").unwrap().kb_metric_key(), "accuracy");
        assert_eq!(Scorer::from_name("balanced_accuracy").unwrap().kb_metric_key(), "bal_accuracy");
        assert_eq!(Scorer::from_name("f1").unwrap(), Scorer::F1Macro);
        assert_eq!(Scorer::F1Macro.kb_metric_key(), "macrof1");
        assert_eq!(Scorer::R2.kb_metric_key(), "r2_cv_mean");
        assert_eq!(
            Scorer::default_for(Mode::Regression).kb_metric_key(),
            "neg_mean_squared_error_cv_mean"
        );
    }

    #[test]
    fn test_resolution_errors() {
        assert!(matches!(Scorer::from_name("roc_auc"), Err(MetaMlError::ConfigError(_))));
        assert!(matches!(
            Scorer::resolve(Some("r2"), Mode::Classification),
            Err(MetaMlError::ConfigError(_))
        ));
        assert_eq!(Scorer::resolve(None, Mode::Classification).unwrap(), Scorer::Accuracy);
    }

    #[test]
    fn test_classification_scores() {
        let t = array![0.0, 0.0, 0.0, 1.0];
        let p = array![0.0, 0.0, 0.0, 0.0];
        assert_eq!(Scorer::Accuracy.score(&t, &p).unwrap(), 0.75);
        assert_eq!(Scorer::BalancedAccuracy.score(&t, &p).unwrap(), 0.5);
        // class 0: 2*3/(4+3) = 6/7, class 1: 0
        let f1 = Scorer::F1Macro.score(&t, &p).unwrap();
        assert!((f1 - 3.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_regression_scores() {
        let t = array![1.0, 2.0, 3.0];
        assert_eq!(Scorer::R2.score(&t, &t).unwrap(), 1.0);
        assert_eq!(Scorer::NegMeanSquaredError.score(&t, &array![2.0, 2.0, 2.0]).unwrap(), -2.0 / 3.0);
        assert_eq!(Scorer::R2.score(&t, &array![2.0, 2.0, 2.0]).unwrap(), 0.0);
        let shifted = array![2.0, 3.0, 4.0];
        assert_eq!(Scorer::ExplainedVariance.score(&t, &shifted).unwrap(), 1.0);
    }

    #[test]
    fn test_constant_target() {
        let t = array![5.0, 5.0];
        assert_eq!(Scorer::R2.score(&t, &t).unwrap(), 1.0);
        assert_eq!(Scorer::R2.score(&t, &array![4.0, 5.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(Scorer::Accuracy.score(&array![1.0], &array![1.0, 0.0]).is_err());
    }
}
