//! Observations and the append-only results ledger

use crate::catalog::candidate_key;
use crate::params::ParamMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Mean cross-validated score of one candidate on one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub dataset_id: String,
    pub algorithm: String,
    pub parameters: ParamMap,
    /// Knowledgebase metric key the value is reported under
    pub metric: String,
    pub value: f64,
}

impl Observation {
    pub fn new(
        dataset_id: impl Into<String>,
        algorithm: impl Into<String>,
        parameters: ParamMap,
        metric: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            algorithm: algorithm.into(),
            parameters,
            metric: metric.into(),
            value,
        }
    }

    pub fn candidate_key(&self) -> String {
        candidate_key(&self.algorithm, &self.parameters)
    }
}

/// Every successful observation of a run, in arrival order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultsLedger {
    records: Vec<Observation>,
}

impl ResultsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, observations: &[Observation]) {
        self.records.extend_from_slice(observations);
    }

    /// Records in arrival order
    pub fn records(&self) -> &[Observation] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records sorted by descending value; equal values keep arrival order
    pub fn ranked(&self) -> Vec<&Observation> {
        let mut ranked: Vec<&Observation> = self.records.iter().collect();
        ranked.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(Ordering::Equal));
        ranked
    }

    /// Top record of [`ranked`](Self::ranked)
    pub fn best(&self) -> Option<&Observation> {
        self.ranked().into_iter().next()
    }

    /// The first `n` ranked records; repeated configurations are kept
    pub fn top(&self, n: usize) -> Vec<&Observation> {
        self.ranked().into_iter().take(n).collect()
    }
}
