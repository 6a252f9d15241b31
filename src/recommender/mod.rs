//! Recommenders rank the candidate pool for a dataset and learn from scores
//!
//! The orchestrator only talks to the [`Recommender`] trait. Strategies:
//! - [`RandomRecommender`]: seeded shuffle, the default
//! - [`AverageRecommender`]: mean historical score per candidate
//! - [`KnnMetaRecommender`]: scores from the nearest datasets in metafeature space
//!
//! Every strategy ranks candidates not yet evaluated on the dataset ahead of
//! those already evaluated, so a call always returns `min(n_recs, pool)` entries.

mod average;
mod history;
mod knn_meta;
mod random;

pub use average::AverageRecommender;
pub use history::{History, ScoreStats};
pub use knn_meta::KnnMetaRecommender;
pub use random::RandomRecommender;

use crate::catalog::Candidate;
use crate::dataset::DatasetDescriptor;
use crate::error::{MetaMlError, Result};
use crate::ledger::Observation;
use crate::metafeatures::Metafeatures;
use crate::mode::Mode;
use crate::params::ParamMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::Path;

/// Provenance of observations passed to [`Recommender::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    /// Historical records used to bootstrap
    Knowledgebase,
    /// Scores observed during the current run
    Live,
}

/// One ranked candidate for a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub dataset_id: String,
    pub algorithm: String,
    pub parameters: ParamMap,
    pub score: f64,
}

/// Ranked output of [`Recommender::recommend`]: three parallel sequences
/// ordered by descending recommender score
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recommendations {
    pub algorithms: Vec<String>,
    pub parameters: Vec<ParamMap>,
    pub scores: Vec<f64>,
}

impl Recommendations {
    pub fn push(&mut self, algorithm: String, parameters: ParamMap, score: f64) {
        self.algorithms.push(algorithm);
        self.parameters.push(parameters);
        self.scores.push(score);
    }

    pub fn len(&self) -> usize {
        self.algorithms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.algorithms.is_empty()
    }

    /// Zip the sequences into records tagged with `dataset_id`
    pub fn into_recommendations(self, dataset_id: &str) -> Vec<Recommendation> {
        self.algorithms
            .into_iter()
            .zip(self.parameters)
            .zip(self.scores)
            .map(|((algorithm, parameters), score)| Recommendation {
                dataset_id: dataset_id.to_string(),
                algorithm,
                parameters,
                score,
            })
            .collect()
    }
}

/// Construction inputs shared by every strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommenderConfig {
    /// Knowledgebase metric key the recommender ranks by
    pub metric: String,
    pub mode: Mode,
    pub candidates: Vec<Candidate>,
    pub random_state: Option<u64>,
}

impl RecommenderConfig {
    pub fn new(metric: impl Into<String>, mode: Mode, candidates: Vec<Candidate>) -> Self {
        Self {
            metric: metric.into(),
            mode,
            candidates,
            random_state: None,
        }
    }

    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.metric.trim().is_empty() {
            return Err(MetaMlError::RecommenderError("no metric given".to_string()));
        }
        if self.candidates.is_empty() {
            return Err(MetaMlError::RecommenderError(
                "candidate pool is empty, no algorithms available".to_string(),
            ));
        }
        Ok(())
    }
}

/// A stateful ranking strategy over a fixed candidate pool
pub trait Recommender: Send {
    fn name(&self) -> &str;

    fn config(&self) -> &RecommenderConfig;

    /// Incorporate new observations and dataset descriptors. Safe to call
    /// with no results, in which case the state is left untouched.
    fn update(
        &mut self,
        results: &[Observation],
        descriptors: &[DatasetDescriptor],
        source: ResultSource,
    ) -> Result<()>;

    /// Rank up to `n_recs` candidates for a dataset. Two calls without an
    /// intervening `update` return the same ranking.
    fn recommend(&self, dataset_id: &str, n_recs: usize, metafeatures: &Metafeatures) -> Result<Recommendations>;

    /// Serializable copy of the recommender's state
    fn snapshot(&self) -> Result<RecommenderSnapshot> {
        Err(MetaMlError::RecommenderError(format!(
            "{} does not support persistence",
            self.name()
        )))
    }
}

/// Built-in strategy selector used by configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommenderKind {
    #[default]
    Random,
    Average,
    KnnMeta,
}

impl RecommenderKind {
    pub fn build(&self, config: RecommenderConfig) -> Result<Box<dyn Recommender>> {
        Ok(match self {
            RecommenderKind::Random => Box::new(RandomRecommender::new(config)?),
            RecommenderKind::Average => Box::new(AverageRecommender::new(config)?),
            RecommenderKind::KnnMeta => Box::new(KnnMetaRecommender::new(config)?),
        })
    }
}

/// Persisted recommender state, tagged by strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RecommenderSnapshot {
    Random {
        config: RecommenderConfig,
        seed: u64,
        history: History,
    },
    Average {
        config: RecommenderConfig,
        history: History,
    },
    KnnMeta {
        config: RecommenderConfig,
        n_neighbors: usize,
        history: History,
    },
}

impl RecommenderSnapshot {
    pub fn config(&self) -> &RecommenderConfig {
        match self {
            RecommenderSnapshot::Random { config, .. }
            | RecommenderSnapshot::Average { config, .. }
            | RecommenderSnapshot::KnnMeta { config, .. } => config,
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            MetaMlError::ConfigError(format!("cannot read serialized recommender {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Fail unless the snapshot was trained for `metric` and `mode`
    pub fn check_compatible(&self, metric: &str, mode: Mode) -> Result<()> {
        let config = self.config();
        if config.metric != metric || config.mode != mode {
            return Err(MetaMlError::ConfigError(format!(
                "serialized recommender was built for metric '{}' in {} mode, this run uses '{}' in {} mode",
                config.metric, config.mode, metric, mode
            )));
        }
        Ok(())
    }

    /// Rebuild the live recommender
    pub fn restore(self) -> Result<Box<dyn Recommender>> {
        Ok(match self {
            RecommenderSnapshot::Random { config, seed, history } => {
                Box::new(RandomRecommender::from_parts(config, seed, history)?)
            }
            RecommenderSnapshot::Average { config, history } => {
                Box::new(AverageRecommender::from_parts(config, history)?)
            }
            RecommenderSnapshot::KnnMeta {
                config,
                n_neighbors,
                history,
            } => Box::new(KnnMetaRecommender::from_parts(config, n_neighbors, history)?),
        })
    }
}

/// Order the pool with unevaluated candidates first, then by descending
/// expected score; equal keys keep catalog order
pub(crate) fn rank_candidates(
    pool: &[Candidate],
    expected: &[f64],
    evaluated: &BTreeSet<&str>,
    n_recs: usize,
) -> Recommendations {
    let seen: Vec<bool> = pool.iter().map(|c| evaluated.contains(c.key().as_str())).collect();
    let mut order: Vec<usize> = (0..pool.len()).collect();
    order.sort_by(|&a, &b| {
        seen[a]
            .cmp(&seen[b])
            .then_with(|| expected[b].partial_cmp(&expected[a]).unwrap_or(Ordering::Equal))
    });

    let mut recs = Recommendations::default();
    for i in order.into_iter().take(n_recs) {
        recs.push(pool[i].algorithm.clone(), pool[i].parameters.clone(), expected[i]);
    }
    recs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamValue;

    pub(crate) fn pool(n: i64) -> Vec<Candidate> {
        (0..n)
            .map(|k| {
                Candidate::new(
                    "KNeighborsClassifier",
                    Mode::Classification,
                    ParamMap::from([("n_neighbors".to_string(), ParamValue::Int(k + 1))]),
                )
            })
            .collect()
    }

    #[test]
    fn test_rank_puts_unevaluated_first() {
        let pool = pool(4);
        let key0 = pool[0].key();
        let evaluated: BTreeSet<&str> = [key0.as_str()].into_iter().collect();
        let recs = rank_candidates(&pool, &[0.9, 0.1, 0.5, 0.5], &evaluated, 4);

        let ks: Vec<&ParamValue> = recs.parameters.iter().map(|p| &p["n_neighbors"]).collect();
        assert_eq!(
            ks,
            vec![&ParamValue::Int(3), &ParamValue::Int(4), &ParamValue::Int(2), &ParamValue::Int(1)]
        );
        assert_eq!(recs.scores, vec![0.5, 0.5, 0.1, 0.9]);
    }

    #[test]
    fn test_rank_never_exceeds_pool() {
        let pool = pool(3);
        let recs = rank_candidates(&pool, &[0.0; 3], &BTreeSet::new(), 10);
        assert_eq!(recs.len(), 3);
    }

    #[test]
    fn test_config_validation() {
        assert!(RecommenderConfig::new("accuracy", Mode::Classification, pool(1)).validate().is_ok());
        assert!(RecommenderConfig::new("", Mode::Classification, pool(1)).validate().is_err());
        assert!(matches!(
            RecommenderConfig::new("accuracy", Mode::Classification, vec![]).validate(),
            Err(MetaMlError::RecommenderError(_))
        ));
    }

    #[test]
    fn test_into_recommendations() {
        let recs = rank_candidates(&pool(2), &[0.2, 0.4], &BTreeSet::new(), 2);
        let records = recs.into_recommendations("d9");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].dataset_id, "d9");
        assert_eq!(records[0].score, 0.4);
    }

    #[test]
    fn test_snapshot_round_trip_through_file() {
        let config = RecommenderConfig::new("accuracy", Mode::Classification, pool(3)).with_random_state(Some(5));
        let rec = RecommenderKind::Average.build(config).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.json");
        rec.snapshot().unwrap().save(&path).unwrap();

        let loaded = RecommenderSnapshot::load(&path).unwrap();
        assert!(loaded.check_compatible("accuracy", Mode::Classification).is_ok());
        assert!(loaded.check_compatible("bal_accuracy", Mode::Classification).is_err());
        assert_eq!(loaded.restore().unwrap().name(), "AverageRecommender");
    }

    #[test]
    fn test_snapshot_missing_file_is_config_error() {
        assert!(matches!(
            RecommenderSnapshot::load("/nonexistent/rec.json"),
            Err(MetaMlError::ConfigError(_))
        ));
    }
}
