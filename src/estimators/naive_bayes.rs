//! Gaussian naive Bayes for continuous features

use super::{check_fit_input, check_n_features, class_labels, unknown_parameter, Estimator};
use crate::error::{MetaMlError, Result};
use crate::params::{expect_f64, invalid_parameter, ParamValue};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Per-class statistics learned by [`GaussianNB`]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClassStats {
    label: i64,
    log_prior: f64,
    means: Vec<f64>,
    variances: Vec<f64>,
}

/// Gaussian naive Bayes classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNB {
    /// Fraction of the largest feature variance added to every variance
    pub var_smoothing: f64,
    classes: Vec<ClassStats>,
    n_features: usize,
}

impl Default for GaussianNB {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianNB {
    pub fn new() -> Self {
        Self {
            var_smoothing: 1e-9,
            classes: Vec::new(),
            n_features: 0,
        }
    }

    fn joint_log_likelihood(&self, row: ArrayView1<f64>, stats: &ClassStats) -> f64 {
        stats.log_prior
            + row
                .iter()
                .zip(stats.means.iter().zip(stats.variances.iter()))
                .map(|(&xi, (&mean, &var))| -0.5 * ((xi - mean).powi(2) / var + var.ln() + (2.0 * PI).ln()))
                .sum::<f64>()
    }
}

impl Estimator for GaussianNB {
    fn name(&self) -> &str {
        "GaussianNB"
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "var_smoothing" => {
                let v = expect_f64(name, value)?;
                if v < 0.0 {
                    return Err(invalid_parameter(name, value, "must be non-negative"));
                }
                self.var_smoothing = v;
            }
            _ => return Err(unknown_parameter(self.name(), name, value)),
        }
        Ok(())
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n_samples = x.nrows() as f64;
        let n_features = x.ncols();

        let max_var = x
            .columns()
            .into_iter()
            .map(|c| c.var(0.0))
            .fold(0.0, f64::max);
        let epsilon = match self.var_smoothing * max_var {
            e if e > 0.0 => e,
            _ => 1e-9,
        };

        let mut classes = Vec::new();
        for label in class_labels(y) {
            let rows: Vec<usize> = (0..y.len()).filter(|&i| y[i].round() as i64 == label).collect();
            let count = rows.len() as f64;

            // Welford's single-pass mean and variance
            let mut means = vec![0.0; n_features];
            let mut m2 = vec![0.0; n_features];
            for (seen, &idx) in rows.iter().enumerate() {
                let n = (seen + 1) as f64;
                for (j, &v) in x.row(idx).iter().enumerate() {
                    let delta = v - means[j];
                    means[j] += delta / n;
                    m2[j] += delta * (v - means[j]);
                }
            }
            let variances = m2.iter().map(|&s| s / count + epsilon).collect();

            classes.push(ClassStats {
                label,
                log_prior: (count / n_samples).ln(),
                means,
                variances,
            });
        }

        self.classes = classes;
        self.n_features = n_features;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.classes.is_empty() {
            return Err(MetaMlError::ModelNotFitted);
        }
        check_n_features(self.n_features, x)?;

        Ok(x.rows()
            .into_iter()
            .map(|row| {
                let mut best = (f64::NEG_INFINITY, self.classes[0].label);
                for stats in &self.classes {
                    let ll = self.joint_log_likelihood(row, stats);
                    if ll > best.0 {
                        best = (ll, stats.label);
                    }
                }
                best.1 as f64
            })
            .collect())
    }
}
