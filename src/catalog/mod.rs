//! Algorithm catalog
//!
//! Loads declarative algorithm definitions, keeps the ones for the requested
//! mode, and expands each hyperparameter grid into enumerated candidates:
//! - definitions with a hyperparameter lacking a value set are skipped
//! - combinations matching an invalid-combination rule are removed
//! - duplicate (algorithm, parameters) pairs are a hard error

mod definition;
mod grid;

pub use definition::{AlgorithmDefinition, HyperparameterSchema, HyperparameterUi, InvalidCombination};

use crate::error::{MetaMlError, Result};
use crate::mode::Mode;
use crate::params::{parameter_key, ParamMap, ParamValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, error, info, warn};

const BUILTIN_CATALOG: &str = include_str!("../../resources/algorithms.json");

/// Identity of a candidate: algorithm name plus canonical parameter string
pub fn candidate_key(algorithm: &str, parameters: &ParamMap) -> String {
    format!("{} {}", algorithm, parameter_key(parameters))
}

/// One concrete (algorithm, hyperparameter assignment) eligible for evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub algorithm: String,
    pub category: Mode,
    pub parameters: ParamMap,
    /// Fixed settings of the algorithm; they win over `parameters` on conflict
    #[serde(default)]
    pub static_parameters: ParamMap,
}

impl Candidate {
    pub fn new(algorithm: impl Into<String>, category: Mode, parameters: ParamMap) -> Self {
        Self {
            algorithm: algorithm.into(),
            category,
            parameters,
            static_parameters: ParamMap::new(),
        }
    }

    pub fn with_static_parameters(mut self, static_parameters: ParamMap) -> Self {
        self.static_parameters = static_parameters;
        self
    }

    pub fn key(&self) -> String {
        candidate_key(&self.algorithm, &self.parameters)
    }
}

/// Enumerated candidate pool for one mode
#[derive(Debug, Clone)]
pub struct Catalog {
    mode: Mode,
    definitions: Vec<AlgorithmDefinition>,
    candidates: Vec<Candidate>,
    skipped: Vec<String>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Load a catalog document from disk
    pub fn load(path: impl AsRef<Path>, mode: Mode) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            MetaMlError::CatalogError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json, mode)
    }

    /// The catalog shipped with the crate, covering every built-in estimator
    pub fn builtin(mode: Mode) -> Result<Self> {
        Self::from_json_str(BUILTIN_CATALOG, mode)
    }

    /// Parse a catalog document (a JSON list of algorithm definitions)
    pub fn from_json_str(json: &str, mode: Mode) -> Result<Self> {
        let definitions: Vec<AlgorithmDefinition> = serde_json::from_str(json)
            .map_err(|e| MetaMlError::CatalogError(format!("malformed catalog document: {}", e)))?;
        Self::from_definitions(definitions, mode)
    }

    /// Expand already-parsed definitions
    pub fn from_definitions(definitions: Vec<AlgorithmDefinition>, mode: Mode) -> Result<Self> {
        let mut kept = Vec::new();
        let mut skipped = Vec::new();
        let mut candidates = Vec::new();

        for def in definitions.into_iter().filter(|d| d.category == mode.as_str()) {
            debug!(algorithm = %def.name, "Checking algorithm definition");

            let malformed = def.malformed_hyperparameters();
            if !malformed.is_empty() {
                warn!(
                    algorithm = %def.name,
                    hyperparameters = ?malformed,
                    "Hyperparameters without an enumerable value set, algorithm skipped"
                );
                skipped.push(def.name.clone());
                continue;
            }

            let space: Vec<(String, Vec<ParamValue>)> = def
                .schema
                .iter()
                .filter_map(|(name, schema)| {
                    schema.enumerable_values().map(|v| (name.clone(), v.to_vec()))
                })
                .collect();

            let rules = def.invalid_rules();
            let combos = grid::cartesian_product(&space);
            let n_total = combos.len();

            let before = candidates.len();
            candidates.extend(
                combos
                    .into_iter()
                    .filter(|combo| grid::is_valid(combo, &rules))
                    .map(|combo| {
                        Candidate::new(def.name.clone(), mode, combo)
                            .with_static_parameters(def.static_parameters.clone())
                    }),
            );
            debug!(
                algorithm = %def.name,
                combinations = n_total,
                kept = candidates.len() - before,
                "Expanded hyperparameter grid"
            );

            kept.push(def);
        }

        let mut index = HashMap::with_capacity(candidates.len());
        for (i, c) in candidates.iter().enumerate() {
            if index.insert(c.key(), i).is_some() {
                return Err(MetaMlError::DuplicateCandidate {
                    algorithm: c.algorithm.clone(),
                    parameters: parameter_key(&c.parameters),
                });
            }
        }

        if candidates.is_empty() {
            error!(mode = %mode, "Catalog parsed no candidates, no algorithms available");
        } else {
            info!(
                n_candidates = candidates.len(),
                algorithms = ?kept.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
                "Algorithm catalog loaded"
            );
        }

        Ok(Self {
            mode,
            definitions: kept,
            candidates,
            skipped,
            index,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Candidates in catalog order
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Definitions that survived mode filtering and validation
    pub fn definitions(&self) -> &[AlgorithmDefinition] {
        &self.definitions
    }

    /// Names of definitions skipped as malformed
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    /// Distinct algorithm names in catalog order
    pub fn algorithms(&self) -> Vec<&str> {
        self.definitions.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn static_parameters(&self, algorithm: &str) -> Option<&ParamMap> {
        self.definitions
            .iter()
            .find(|d| d.name == algorithm)
            .map(|d| &d.static_parameters)
    }

    /// Look up the enumerated candidate for an (algorithm, parameters) pair
    pub fn find(&self, algorithm: &str, parameters: &ParamMap) -> Option<&Candidate> {
        self.index
            .get(&candidate_key(algorithm, parameters))
            .map(|&i| &self.candidates[i])
    }

    /// Position of a candidate in catalog order
    pub fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Keep only the algorithms accepted by `keep`, returning the names removed
    pub fn retain_algorithms<F>(&mut self, mut keep: F) -> Vec<String>
    where
        F: FnMut(&AlgorithmDefinition) -> bool,
    {
        let mut removed = Vec::new();
        self.definitions.retain(|d| {
            let k = keep(d);
            if !k {
                removed.push(d.name.clone());
            }
            k
        });
        if !removed.is_empty() {
            self.candidates.retain(|c| !removed.contains(&c.algorithm));
            self.index = self
                .candidates
                .iter()
                .enumerate()
                .map(|(i, c)| (c.key(), i))
                .collect();
        }
        removed
    }

    /// Candidate count per algorithm
    pub fn counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for c in &self.candidates {
            *counts.entry(c.algorithm.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"[
        {
            "name": "DecisionTreeClassifier",
            "path": "metaml.tree",
            "category": "classification",
            "schema": {
                "criterion": {"ui": {"choices": ["gini", "entropy"]}},
                "max_depth": {"ui": {"values": [2, 4, "None"]}},
                "min_samples_split": {"ui": {"values": [2, 5]}}
            },
            "invalidParameterCombinations": [
                [{"criterion": "entropy"}, {"max_depth": "None"}],
                [{"max_depth": 2}, {"min_samples_split": 5}]
            ]
        },
        {
            "name": "KNeighborsClassifier",
            "category": "classification",
            "schema": {
                "n_neighbors": {"ui": {"values": [1, 3, 5]}},
                "weights": {"ui": {"choices": ["uniform", "distance"]}}
            },
            "static_parameters": {"p": 2}
        },
        {
            "name": "GaussianNB",
            "category": "classification",
            "schema": {
                "var_smoothing": {"description": "no ui block"}
            }
        },
        {
            "name": "Ridge",
            "category": "regression",
            "schema": {"alpha": {"ui": {"values": [0.1, 1.0]}}}
        }
    ]"#;

    #[test]
    fn test_candidate_count_matches_product_minus_invalid() {
        let catalog = Catalog::from_json_str(CATALOG, Mode::Classification).unwrap();
        let counts = catalog.counts();

        // 2 * 3 * 2 = 12; entropy+None removes 2; depth 2 + split 5 removes 2
        assert_eq!(counts["DecisionTreeClassifier"], 8);
        assert_eq!(counts["KNeighborsClassifier"], 6);
        assert_eq!(catalog.len(), 14);
    }

    #[test]
    fn test_malformed_definition_is_skipped() {
        let catalog = Catalog::from_json_str(CATALOG, Mode::Classification).unwrap();
        assert_eq!(catalog.skipped(), &["GaussianNB".to_string()]);
        assert!(!catalog.algorithms().contains(&"GaussianNB"));
    }

    #[test]
    fn test_mode_filter() {
        let catalog = Catalog::from_json_str(CATALOG, Mode::Regression).unwrap();
        assert_eq!(catalog.algorithms(), vec!["Ridge"]);
        assert_eq!(catalog.len(), 2);
        assert!(catalog.candidates().iter().all(|c| c.category == Mode::Regression));
    }

    #[test]
    fn test_no_invalid_candidate_survives() {
        let catalog = Catalog::from_json_str(CATALOG, Mode::Classification).unwrap();
        for c in catalog.candidates() {
            let entropy_none = c.parameters.get("criterion") == Some(&"entropy".into())
                && c.parameters.get("max_depth") == Some(&"None".into());
            let shallow_split = c.parameters.get("max_depth") == Some(&ParamValue::Int(2))
                && c.parameters.get("min_samples_split") == Some(&ParamValue::Int(5));
            assert!(!entropy_none && !shallow_split, "invalid candidate {:?}", c);
        }
    }

    #[test]
    fn test_static_parameters_attached() {
        let catalog = Catalog::from_json_str(CATALOG, Mode::Classification).unwrap();
        let knn = catalog
            .candidates()
            .iter()
            .find(|c| c.algorithm == "KNeighborsClassifier")
            .unwrap();
        assert_eq!(knn.static_parameters["p"], ParamValue::Int(2));
        assert_eq!(
            catalog.static_parameters("KNeighborsClassifier").unwrap()["p"],
            ParamValue::Int(2)
        );
    }

    #[test]
    fn test_find_by_key() {
        let catalog = Catalog::from_json_str(CATALOG, Mode::Classification).unwrap();
        let first = catalog.candidates()[0].clone();
        let found = catalog.find(&first.algorithm, &first.parameters).unwrap();
        assert_eq!(found, &first);
        assert_eq!(catalog.position(&first.key()), Some(0));
    }

    #[test]
    fn test_duplicate_definition_is_an_error() {
        let def = AlgorithmDefinition::new("Ridge", "regression").with_hyperparameter(
            "alpha",
            HyperparameterSchema::with_values(vec![ParamValue::Float(1.0)]),
        );
        let result = Catalog::from_definitions(vec![def.clone(), def], Mode::Regression);
        assert!(matches!(result, Err(MetaMlError::DuplicateCandidate { .. })));
    }

    #[test]
    fn test_empty_catalog_is_reported_not_fatal() {
        let catalog = Catalog::from_json_str("[]", Mode::Classification).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_retain_algorithms() {
        let mut catalog = Catalog::from_json_str(CATALOG, Mode::Classification).unwrap();
        let removed = catalog.retain_algorithms(|d| d.name != "KNeighborsClassifier");
        assert_eq!(removed, vec!["KNeighborsClassifier".to_string()]);
        assert_eq!(catalog.len(), 8);
        let first = catalog.candidates()[0].clone();
        assert_eq!(catalog.position(&first.key()), Some(0));
    }

    #[test]
    fn test_builtin_catalog() {
        let classification = Catalog::builtin(Mode::Classification).unwrap();
        assert_eq!(classification.len(), 99);
        assert!(classification.skipped().is_empty());
        let regression = Catalog::builtin(Mode::Regression).unwrap();
        assert_eq!(regression.len(), 56);
        assert_eq!(regression.static_parameters("DecisionTreeRegressor").unwrap()["criterion"], ParamValue::from("squared_error"));
    }

    #[test]
    fn test_malformed_document() {
        let result = Catalog::from_json_str("{not a list}", Mode::Classification);
        assert!(matches!(result, Err(MetaMlError::CatalogError(_))));
    }
}
