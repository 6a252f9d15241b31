//! Declarative algorithm definitions as read from a catalog document

use crate::params::{ParamMap, ParamValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// UI block of a hyperparameter schema entry; one of the two lists enumerates
/// the values the hyperparameter may take
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HyperparameterUi {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<ParamValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<ParamValue>>,
}

/// Schema entry for a single hyperparameter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HyperparameterSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<HyperparameterUi>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl HyperparameterSchema {
    /// Enumerated value set, preferring `values` over `choices`.
    /// Returns `None` when neither is declared or the declared list is empty.
    pub fn enumerable_values(&self) -> Option<&[ParamValue]> {
        let ui = self.ui.as_ref()?;
        let values = ui.values.as_deref().or(ui.choices.as_deref())?;
        if values.is_empty() {
            None
        } else {
            Some(values)
        }
    }

    /// Convenience constructor for a discrete value list
    pub fn with_values(values: Vec<ParamValue>) -> Self {
        Self {
            ui: Some(HyperparameterUi {
                values: Some(values),
                choices: None,
            }),
            description: None,
        }
    }

    /// Convenience constructor for a choice list
    pub fn with_choices(choices: Vec<ParamValue>) -> Self {
        Self {
            ui: Some(HyperparameterUi {
                values: None,
                choices: Some(choices),
            }),
            description: None,
        }
    }
}

/// A rule is written as a list of single-pair objects,
/// e.g. `[{"penalty": "l1"}, {"dual": true}]`
pub type InvalidCombination = Vec<ParamMap>;

/// One algorithm entry of the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmDefinition {
    /// Algorithm name, also the estimator registry key
    pub name: String,
    /// Namespace the estimator is registered under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// `classification` or `regression`; other categories are ignored
    pub category: String,
    #[serde(default)]
    pub schema: BTreeMap<String, HyperparameterSchema>,
    /// Fixed settings applied on top of the tuned parameters
    #[serde(default)]
    pub static_parameters: ParamMap,
    #[serde(default, rename = "invalidParameterCombinations")]
    pub invalid_parameter_combinations: Vec<InvalidCombination>,
}

impl AlgorithmDefinition {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            category: category.into(),
            schema: BTreeMap::new(),
            static_parameters: ParamMap::new(),
            invalid_parameter_combinations: Vec::new(),
        }
    }

    pub fn with_hyperparameter(mut self, name: impl Into<String>, schema: HyperparameterSchema) -> Self {
        self.schema.insert(name.into(), schema);
        self
    }

    pub fn with_static_parameter(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.static_parameters.insert(name.into(), value);
        self
    }

    pub fn with_invalid_combination(mut self, rule: ParamMap) -> Self {
        self.invalid_parameter_combinations
            .push(rule.into_iter().map(|(k, v)| ParamMap::from([(k, v)])).collect());
        self
    }

    /// Flatten each rule's single-pair objects into one mapping
    pub fn invalid_rules(&self) -> Vec<ParamMap> {
        self.invalid_parameter_combinations
            .iter()
            .map(|rule| {
                rule.iter()
                    .flat_map(|pair| pair.iter().map(|(k, v)| (k.clone(), v.clone())))
                    .collect()
            })
            .collect()
    }

    /// Hyperparameters that lack an enumerable value set
    pub fn malformed_hyperparameters(&self) -> Vec<&str> {
        self.schema
            .iter()
            .filter(|(_, s)| s.enumerable_values().is_none())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
