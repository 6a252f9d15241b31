//! Observed scores and dataset metafeatures accumulated by a recommender

use super::ResultSource;
use crate::dataset::DatasetDescriptor;
use crate::ledger::Observation;
use crate::metafeatures::Metafeatures;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Running sum of the scores one candidate obtained on one dataset
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreStats {
    pub sum: f64,
    pub count: usize,
}

impl ScoreStats {
    pub fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Score history keyed by dataset id then candidate key. JSON object keys
/// must be strings, hence the nesting rather than a tuple key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    scores: BTreeMap<String, BTreeMap<String, ScoreStats>>,
    metafeatures: BTreeMap<String, Metafeatures>,
    n_updates: u64,
    n_knowledgebase: usize,
    n_live: usize,
}

impl History {
    /// Fold observations for `metric` into the history and upsert the
    /// descriptors by dataset id. An empty result set changes nothing.
    /// Returns the number of observations accepted.
    pub fn record(
        &mut self,
        metric: &str,
        results: &[Observation],
        descriptors: &[DatasetDescriptor],
        source: ResultSource,
    ) -> usize {
        if results.is_empty() {
            return 0;
        }

        let mut accepted = 0;
        for obs in results {
            if obs.metric != metric || !obs.value.is_finite() {
                debug!(
                    algorithm = %obs.algorithm,
                    metric = %obs.metric,
                    expected = metric,
                    "Ignoring observation for another metric"
                );
                continue;
            }
            self.scores
                .entry(obs.dataset_id.clone())
                .or_default()
                .entry(obs.candidate_key())
                .or_default()
                .push(obs.value);
            accepted += 1;
        }
        for d in descriptors {
            self.metafeatures.insert(d.id.clone(), d.metafeatures.clone());
        }

        match source {
            ResultSource::Knowledgebase => self.n_knowledgebase += accepted,
            ResultSource::Live => self.n_live += accepted,
        }
        self.n_updates += 1;
        accepted
    }

    /// Number of non-empty updates applied so far
    pub fn n_updates(&self) -> u64 {
        self.n_updates
    }

    pub fn n_observations(&self) -> usize {
        self.n_knowledgebase + self.n_live
    }

    /// Observations that came from a knowledgebase and from live runs
    pub fn provenance(&self) -> (usize, usize) {
        (self.n_knowledgebase, self.n_live)
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Candidate keys already scored on `dataset_id`
    pub fn evaluated(&self, dataset_id: &str) -> BTreeSet<&str> {
        self.scores
            .get(dataset_id)
            .map(|m| m.keys().map(|k| k.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn dataset_scores(&self, dataset_id: &str) -> Option<&BTreeMap<String, ScoreStats>> {
        self.scores.get(dataset_id)
    }

    /// Dataset ids with at least one score
    pub fn datasets(&self) -> impl Iterator<Item = &str> {
        self.scores.keys().map(|k| k.as_str())
    }

    pub fn metafeatures(&self) -> &BTreeMap<String, Metafeatures> {
        &self.metafeatures
    }

    /// Mean score of each candidate across datasets, each dataset weighted equally
    pub fn candidate_means(&self) -> BTreeMap<&str, f64> {
        let mut acc: BTreeMap<&str, ScoreStats> = BTreeMap::new();
        for per_dataset in self.scores.values() {
            for (key, stats) in per_dataset {
                if let Some(m) = stats.mean() {
                    acc.entry(key.as_str()).or_default().push(m);
                }
            }
        }
        acc.into_iter()
            .filter_map(|(k, s)| s.mean().map(|m| (k, m)))
            .collect()
    }

    /// Mean of every per-dataset candidate mean; the prior for unseen candidates
    pub fn overall_mean(&self) -> Option<f64> {
        let mut all = ScoreStats::default();
        for per_dataset in self.scores.values() {
            for stats in per_dataset.values() {
                if let Some(m) = stats.mean() {
                    all.push(m);
                }
            }
        }
        all.mean()
    }
}
