//! Estimators and the name-to-factory registry
//!
//! Catalog entries name algorithms by string. The registry maps each name to
//! a constructor so candidates can be built without evaluating code:
//!
//! ```ignore
//! let registry = EstimatorRegistry::with_builtin();
//! let mut est = registry.instantiate(&candidate, Some(42))?;
//! est.fit(&x, &y)?;
//! ```

mod linear;
mod naive_bayes;
mod neighbors;
mod tree;
mod forest;

pub use forest::RandomForest;
pub use linear::{LinearRegression, LogisticRegression, Ridge};
pub use naive_bayes::GaussianNB;
pub use neighbors::KNeighbors;
pub use tree::{Criterion, DecisionTree, MaxFeatures};

use crate::catalog::Candidate;
use crate::error::{MetaMlError, Result};
use crate::params::{coerce_literals, invalid_parameter, ParamMap, ParamValue};
use ndarray::{Array1, Array2};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A trainable model configured through named parameters
pub trait Estimator: Send + Sync + fmt::Debug {
    /// Registry name of the algorithm
    fn name(&self) -> &str;

    /// Set one parameter. Unknown names and ill-typed values are errors.
    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()>;

    fn set_params(&mut self, params: &ParamMap) -> Result<()> {
        for (name, value) in params {
            self.set_param(name, value)?;
        }
        Ok(())
    }

    /// Whether the estimator takes a `random_state` parameter
    fn accepts_random_state(&self) -> bool {
        false
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;
}

/// Constructor for a default-configured estimator
pub type EstimatorFactory = Arc<dyn Fn() -> Box<dyn Estimator> + Send + Sync>;

/// Maps algorithm names to estimator constructors
#[derive(Clone, Default)]
pub struct EstimatorRegistry {
    factories: BTreeMap<String, EstimatorFactory>,
}

impl EstimatorRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in estimator
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("DecisionTreeClassifier", || Box::new(DecisionTree::classifier()));
        registry.register("DecisionTreeRegressor", || Box::new(DecisionTree::regressor()));
        registry.register("RandomForestClassifier", || Box::new(RandomForest::classifier()));
        registry.register("RandomForestRegressor", || Box::new(RandomForest::regressor()));
        registry.register("KNeighborsClassifier", || Box::new(KNeighbors::classifier()));
        registry.register("KNeighborsRegressor", || Box::new(KNeighbors::regressor()));
        registry.register("GaussianNB", || Box::new(GaussianNB::new()));
        registry.register("LogisticRegression", || Box::new(LogisticRegression::new()));
        registry.register("LinearRegression", || Box::new(LinearRegression::new()));
        registry.register("Ridge", || Box::new(Ridge::new()));
        registry
    }

    /// Register (or replace) the factory for `name`
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Estimator> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(|k| k.as_str()).collect()
    }

    /// A default-configured estimator for `name`
    pub fn create(&self, name: &str) -> Result<Box<dyn Estimator>> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| MetaMlError::UnknownAlgorithm(name.to_string()))
    }

    /// Parameters actually applied for a candidate: coerced tunable values,
    /// then static values on top, then the seed when the estimator takes one
    pub fn effective_parameters(
        candidate: &Candidate,
        accepts_random_state: bool,
        random_state: Option<u64>,
    ) -> ParamMap {
        let mut params = coerce_literals(&candidate.parameters);
        params.extend(coerce_literals(&candidate.static_parameters));
        if let (true, Some(seed)) = (accepts_random_state, random_state) {
            params.insert("random_state".to_string(), ParamValue::Int(seed as i64));
        }
        params
    }

    /// Build and configure the estimator for a candidate
    pub fn instantiate(&self, candidate: &Candidate, random_state: Option<u64>) -> Result<Box<dyn Estimator>> {
        let mut estimator = self.create(&candidate.algorithm)?;
        let params = Self::effective_parameters(candidate, estimator.accepts_random_state(), random_state);
        estimator.set_params(&params)?;
        Ok(estimator)
    }
}

impl fmt::Debug for EstimatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EstimatorRegistry")
            .field("algorithms", &self.names())
            .finish()
    }
}

/// Label with the largest weight; ties go to the smallest label
pub(crate) fn majority_label(weights: &BTreeMap<i64, f64>) -> f64 {
    let mut best: Option<(i64, f64)> = None;
    for (&label, &w) in weights {
        if best.map_or(true, |(_, bw)| w > bw) {
            best = Some((label, w));
        }
    }
    best.map(|(label, _)| label as f64).unwrap_or(0.0)
}

/// Distinct class labels of a target vector, ascending
pub(crate) fn class_labels(y: &Array1<f64>) -> Vec<i64> {
    let mut classes: Vec<i64> = y.iter().map(|v| v.round() as i64).collect();
    classes.sort_unstable();
    classes.dedup();
    classes
}

pub(crate) fn check_fit_input(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(MetaMlError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(MetaMlError::TrainingError("cannot fit on zero samples".to_string()));
    }
    Ok(())
}

pub(crate) fn check_n_features(expected: usize, x: &Array2<f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(MetaMlError::ShapeError {
            expected: format!("{} features", expected),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}

pub(crate) fn unknown_parameter(estimator: &str, name: &str, value: &ParamValue) -> MetaMlError {
    invalid_parameter(name, value, &format!("not a parameter of {}", estimator))
}

/// Read an optional seed; negative integers are reinterpreted as u64
pub(crate) fn expect_seed(name: &str, value: &ParamValue) -> Result<Option<u64>> {
    match value {
        ParamValue::Null => Ok(None),
        _ => value
            .as_i64()
            .map(|v| Some(v as u64))
            .ok_or_else(|| invalid_parameter(name, value, "expected an integer seed or None")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Mode;
    use ndarray::array;

    fn params(pairs: &[(&str, ParamValue)]) -> ParamMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_builtin_names() {
        let registry = EstimatorRegistry::with_builtin();
        assert!(registry.contains("DecisionTreeClassifier"));
        assert!(registry.contains("Ridge"));
        assert!(!registry.contains("SVC"));
        assert_eq!(registry.names().len(), 10);
    }

    #[test]
    fn test_unknown_algorithm() {
        let registry = EstimatorRegistry::with_builtin();
        assert!(matches!(
            registry.create("SVC"),
            Err(MetaMlError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn test_static_parameters_win_and_literals_coerced() {
        let candidate = Candidate::new(
            "KNeighborsClassifier",
            Mode::Classification,
            params(&[("n_neighbors", ParamValue::Int(3)), ("p", ParamValue::Int(1))]),
        )
        .with_static_parameters(params(&[("p", ParamValue::Int(2))]));

        let effective = EstimatorRegistry::effective_parameters(&candidate, false, Some(7));
        assert_eq!(effective["p"], ParamValue::Int(2));
        assert!(!effective.contains_key("random_state"));

        let tree = Candidate::new(
            "DecisionTreeClassifier",
            Mode::Classification,
            params(&[("max_depth", ParamValue::from("None"))]),
        );
        let effective = EstimatorRegistry::effective_parameters(&tree, true, Some(7));
        assert_eq!(effective["max_depth"], ParamValue::Null);
        assert_eq!(effective["random_state"], ParamValue::Int(7));

        let unseeded = EstimatorRegistry::effective_parameters(&tree, true, None);
        assert!(!unseeded.contains_key("random_state"));
    }

    #[test]
    fn test_instantiate_rejects_unknown_parameter() {
        let registry = EstimatorRegistry::with_builtin();
        let candidate = Candidate::new(
            "GaussianNB",
            Mode::Classification,
            params(&[("n_neighbors", ParamValue::Int(3))]),
        );
        assert!(matches!(
            registry.instantiate(&candidate, None),
            Err(MetaMlError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_instantiate_and_fit() {
        let registry = EstimatorRegistry::with_builtin();
        let candidate = Candidate::new(
            "DecisionTreeClassifier",
            Mode::Classification,
            params(&[("max_depth", ParamValue::from("none")), ("criterion", ParamValue::from("gini"))]),
        );
        let mut est = registry.instantiate(&candidate, Some(1)).unwrap();
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        est.fit(&x, &y).unwrap();
        assert_eq!(est.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_custom_factory() {
        let mut registry = EstimatorRegistry::new();
        registry.register("MyRidge", || Box::new(Ridge::new()));
        assert_eq!(registry.names(), vec!["MyRidge"]);
        assert_eq!(registry.create("MyRidge").unwrap().name(), "Ridge");
    }

    #[test]
    fn test_majority_label_ties_go_low() {
        let mut w = BTreeMap::new();
        w.insert(2, 1.0);
        w.insert(0, 1.0);
        w.insert(1, 0.5);
        assert_eq!(majority_label(&w), 0.0);
        assert_eq!(majority_label(&BTreeMap::new()), 0.0);
    }
}
