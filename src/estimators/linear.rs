//! Linear models: ordinary least squares, ridge and binary logistic regression

use super::{check_fit_input, check_n_features, class_labels, expect_seed, unknown_parameter, Estimator};
use crate::error::{MetaMlError, Result};
use crate::params::{expect_bool, expect_f64, expect_usize, invalid_parameter, ParamValue};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Solve the symmetric positive-definite system `a x = b` by Cholesky
/// decomposition. Returns `None` when `a` is not positive definite.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // L y = b, then L^T x = y
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * y[j]).sum();
        y[i] = (b[i] - sum) / l[[i, i]];
    }
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[[j, i]] * x[j]).sum();
        x[i] = (y[i] - sum) / l[[i, i]];
    }
    Some(x)
}

/// Solve the normal equations, adding a small diagonal jitter when the Gram
/// matrix is singular (collinear or constant features)
fn solve_normal_equations(mut xtx: Array2<f64>, xty: &Array1<f64>) -> Result<Array1<f64>> {
    if let Some(w) = cholesky_solve(&xtx, xty) {
        return Ok(w);
    }
    let n = xtx.nrows();
    let scale = xtx.diag().iter().map(|v| v.abs()).sum::<f64>() / n.max(1) as f64;
    let jitter = 1e-8 * scale.max(1.0);
    for k in 0..n {
        xtx[[k, k]] += jitter;
    }
    cholesky_solve(&xtx, xty)
        .ok_or_else(|| MetaMlError::TrainingError("singular matrix, cannot solve least squares".to_string()))
}

/// Fit `y ~ x w + b` with an L2 penalty `alpha`; returns (coefficients, intercept)
fn fit_least_squares(x: &Array2<f64>, y: &Array1<f64>, alpha: f64, fit_intercept: bool) -> Result<(Array1<f64>, f64)> {
    let (x_c, y_c, x_mean, y_mean) = if fit_intercept {
        let x_mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| MetaMlError::TrainingError("empty feature matrix".to_string()))?;
        let y_mean = y.mean().unwrap_or(0.0);
        (x - &x_mean.view().insert_axis(Axis(0)), y - y_mean, Some(x_mean), y_mean)
    } else {
        (x.clone(), y.clone(), None, 0.0)
    };

    let mut xtx = x_c.t().dot(&x_c);
    for i in 0..xtx.nrows() {
        xtx[[i, i]] += alpha;
    }
    let xty = x_c.t().dot(&y_c);
    let coefficients = solve_normal_equations(xtx, &xty)?;
    let intercept = match x_mean {
        Some(m) => y_mean - coefficients.dot(&m),
        None => 0.0,
    };
    Ok((coefficients, intercept))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LinearFit {
    coefficients: Array1<f64>,
    intercept: f64,
}

impl LinearFit {
    fn decision(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_n_features(self.coefficients.len(), x)?;
        Ok(x.dot(&self.coefficients) + self.intercept)
    }
}

/// Ordinary least squares regression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    pub fit_intercept: bool,
    fitted: Option<LinearFit>,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearRegression {
    pub fn new() -> Self {
        Self {
            fit_intercept: true,
            fitted: None,
        }
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.fitted.as_ref().map(|f| &f.coefficients)
    }
}

impl Estimator for LinearRegression {
    fn name(&self) -> &str {
        "LinearRegression"
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "fit_intercept" => self.fit_intercept = expect_bool(name, value)?,
            _ => return Err(unknown_parameter(self.name(), name, value)),
        }
        Ok(())
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let (coefficients, intercept) = fit_least_squares(x, y, 0.0, self.fit_intercept)?;
        self.fitted = Some(LinearFit { coefficients, intercept });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.fitted.as_ref().ok_or(MetaMlError::ModelNotFitted)?.decision(x)
    }
}

/// L2-regularized least squares regression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ridge {
    pub alpha: f64,
    pub fit_intercept: bool,
    pub random_state: Option<u64>,
    fitted: Option<LinearFit>,
}

impl Default for Ridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Ridge {
    pub fn new() -> Self {
        Self {
            alpha: 1.0,
            fit_intercept: true,
            random_state: None,
            fitted: None,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }
}

impl Estimator for Ridge {
    fn name(&self) -> &str {
        "Ridge"
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "alpha" => {
                let v = expect_f64(name, value)?;
                if v < 0.0 {
                    return Err(invalid_parameter(name, value, "must be non-negative"));
                }
                self.alpha = v;
            }
            "fit_intercept" => self.fit_intercept = expect_bool(name, value)?,
            // Accepted for compatibility; the closed-form solver is deterministic
            "random_state" => self.random_state = expect_seed(name, value)?,
            _ => return Err(unknown_parameter(self.name(), name, value)),
        }
        Ok(())
    }

    fn accepts_random_state(&self) -> bool {
        true
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let (coefficients, intercept) = fit_least_squares(x, y, self.alpha, self.fit_intercept)?;
        self.fitted = Some(LinearFit { coefficients, intercept });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.fitted.as_ref().ok_or(MetaMlError::ModelNotFitted)?.decision(x)
    }
}

/// Learned state of a [`LogisticRegression`]; features are standardized
/// with the training mean and scale before the linear decision
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LogisticFit {
    linear: LinearFit,
    mean: Array1<f64>,
    scale: Array1<f64>,
    classes: [i64; 2],
}

/// Binary logistic regression trained by gradient descent.
///
/// More than two classes in the training target is a training error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Inverse regularization strength
    pub c: f64,
    pub fit_intercept: bool,
    pub max_iter: usize,
    pub tol: f64,
    pub learning_rate: f64,
    fitted: Option<LogisticFit>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            c: 1.0,
            fit_intercept: true,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 0.1,
            fitted: None,
        }
    }

    fn sigmoid(z: f64) -> f64 {
        1.0 / (1.0 + (-z).exp())
    }
}

impl Estimator for LogisticRegression {
    fn name(&self) -> &str {
        "LogisticRegression"
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "C" => {
                let v = expect_f64(name, value)?;
                if v <= 0.0 {
                    return Err(invalid_parameter(name, value, "must be positive"));
                }
                self.c = v;
            }
            "fit_intercept" => self.fit_intercept = expect_bool(name, value)?,
            "max_iter" => self.max_iter = expect_usize(name, value)?,
            "tol" => self.tol = expect_f64(name, value)?,
            "penalty" => match value.as_str() {
                Some("l2") => {}
                _ => return Err(invalid_parameter(name, value, "only the l2 penalty is supported")),
            },
            _ => return Err(unknown_parameter(self.name(), name, value)),
        }
        Ok(())
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let labels = class_labels(y);
        let classes = match labels.as_slice() {
            [a, b] => [*a, *b],
            [a] => [*a, *a],
            _ => {
                return Err(MetaMlError::TrainingError(format!(
                    "LogisticRegression supports binary targets only, found {} classes",
                    labels.len()
                )))
            }
        };

        let n_samples = x.nrows() as f64;
        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| MetaMlError::TrainingError("empty feature matrix".to_string()))?;
        let scale = x.std_axis(Axis(0), 0.0).mapv(|s| if s > 0.0 { s } else { 1.0 });
        let xs = (x - &mean.view().insert_axis(Axis(0))) / &scale.view().insert_axis(Axis(0));
        let target = y.mapv(|v| if v.round() as i64 == classes[1] && classes[0] != classes[1] { 1.0 } else { 0.0 });

        let mut weights = Array1::<f64>::zeros(x.ncols());
        let mut bias = 0.0;
        let penalty = 1.0 / (self.c * n_samples);

        for _ in 0..self.max_iter {
            let probs = (xs.dot(&weights) + bias).mapv(Self::sigmoid);
            let errors = &probs - &target;
            let dw = xs.t().dot(&errors) / n_samples + &weights * penalty;
            let db = if self.fit_intercept { errors.mean().unwrap_or(0.0) } else { 0.0 };

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < self.tol {
                break;
            }
            weights = weights - self.learning_rate * dw;
            bias -= self.learning_rate * db;
        }

        self.fitted = Some(LogisticFit {
            linear: LinearFit {
                coefficients: weights,
                intercept: bias,
            },
            mean,
            scale,
            classes,
        });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let fit = self.fitted.as_ref().ok_or(MetaMlError::ModelNotFitted)?;
        check_n_features(fit.mean.len(), x)?;
        let xs = (x - &fit.mean.view().insert_axis(Axis(0))) / &fit.scale.view().insert_axis(Axis(0));
        let decision = fit.linear.decision(&xs)?;
        Ok(decision.mapv(|z| {
            let label = if Self::sigmoid(z) >= 0.5 { fit.classes[1] } else { fit.classes[0] };
            label as f64
        }))
    }
}
