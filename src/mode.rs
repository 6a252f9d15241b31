//! Learning task mode shared by the catalog, recommenders and orchestrator

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supervised learning mode of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Classification,
    Regression,
}

impl Mode {
    /// Category string used by algorithm definitions and knowledgebase records
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Classification => "classification",
            Mode::Regression => "regression",
        }
    }

    /// Kind of estimator this mode trains
    pub fn ml_type(&self) -> &'static str {
        match self {
            Mode::Classification => "classifier",
            Mode::Regression => "regressor",
        }
    }

    pub fn is_classification(&self) -> bool {
        matches!(self, Mode::Classification)
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Classification
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
