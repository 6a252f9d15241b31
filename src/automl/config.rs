//! Run configuration

use crate::error::{MetaMlError, Result};
use crate::evaluation::{Parallelism, Scorer, DEFAULT_CV_FOLDS};
use crate::mode::Mode;
use crate::recommender::RecommenderKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for an [`AutoMl`](super::AutoMl) run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoMlConfig {
    /// Classification or regression
    pub mode: Mode,

    /// Scorer name; `None` uses the mode default
    pub scoring: Option<String>,

    /// Built-in recommender strategy
    pub recommender: RecommenderKind,

    /// Recommendations evaluated per iteration
    pub n_recs: usize,

    /// Maximum number of iterations
    pub n_iters: usize,

    /// Cross-validation folds per candidate
    pub cv_folds: usize,

    /// Finish with a voting ensemble of the top N ledger entries
    pub ensemble: Option<usize>,

    /// Wall-clock budget in minutes
    pub max_time_mins: Option<f64>,

    /// Stop after this many consecutive iterations without improvement
    pub stopping_criteria: Option<usize>,

    /// Random seed
    pub random_state: Option<u64>,

    /// Evaluation workers: 1 sequential, -1 all cores
    pub n_jobs: i32,

    /// 0 errors only, 1 progress, 2 and above debug
    pub verbosity: u8,

    /// Algorithm catalog document; the built-in catalog when unset
    pub algorithm_catalog: Option<PathBuf>,

    /// Historical results document
    pub knowledgebase: Option<PathBuf>,

    /// Historical metafeatures document, required with `knowledgebase`
    pub kb_metafeatures: Option<PathBuf>,

    /// Saved recommender to resume from instead of bootstrapping
    pub serialized_recommender: Option<PathBuf>,
}

impl Default for AutoMlConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Classification,
            scoring: None,
            recommender: RecommenderKind::Random,
            n_recs: 10,
            n_iters: 10,
            cv_folds: DEFAULT_CV_FOLDS,
            ensemble: None,
            max_time_mins: None,
            stopping_criteria: None,
            random_state: None,
            n_jobs: 1,
            verbosity: 0,
            algorithm_catalog: None,
            knowledgebase: None,
            kb_metafeatures: None,
            serialized_recommender: None,
        }
    }
}

impl AutoMlConfig {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Read a JSON configuration file; absent fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            MetaMlError::ConfigError(format!("cannot read config {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&json)
            .map_err(|e| MetaMlError::ConfigError(format!("malformed config {}: {}", path.display(), e)))
    }

    pub fn with_scoring(mut self, scoring: impl Into<String>) -> Self {
        self.scoring = Some(scoring.into());
        self
    }

    pub fn with_recommender(mut self, kind: RecommenderKind) -> Self {
        self.recommender = kind;
        self
    }

    /// Zero is raised to one
    pub fn with_n_recs(mut self, n: usize) -> Self {
        self.n_recs = n.max(1);
        self
    }

    pub fn with_n_iters(mut self, n: usize) -> Self {
        self.n_iters = n;
        self
    }

    pub fn with_cv_folds(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    pub fn with_ensemble(mut self, n: usize) -> Self {
        self.ensemble = Some(n);
        self
    }

    pub fn with_max_time_mins(mut self, mins: f64) -> Self {
        self.max_time_mins = Some(mins);
        self
    }

    pub fn with_stopping_criteria(mut self, n: usize) -> Self {
        self.stopping_criteria = Some(n);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn with_n_jobs(mut self, n_jobs: i32) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_algorithm_catalog(mut self, path: impl Into<PathBuf>) -> Self {
        self.algorithm_catalog = Some(path.into());
        self
    }

    pub fn with_knowledgebase(mut self, results: impl Into<PathBuf>, metafeatures: impl Into<PathBuf>) -> Self {
        self.knowledgebase = Some(results.into());
        self.kb_metafeatures = Some(metafeatures.into());
        self
    }

    pub fn with_serialized_recommender(mut self, path: impl Into<PathBuf>) -> Self {
        self.serialized_recommender = Some(path.into());
        self
    }

    /// Recommendations per iteration, never below one
    pub fn effective_n_recs(&self) -> usize {
        self.n_recs.max(1)
    }

    pub fn scorer(&self) -> Result<Scorer> {
        Scorer::resolve(self.scoring.as_deref(), self.mode)
    }

    /// Wall-clock budget; a value too large for a `Duration` is rejected by
    /// `validate` and read as no limit here
    pub fn max_time(&self) -> Option<Duration> {
        self.max_time_mins
            .and_then(|m| Duration::try_from_secs_f64(m.max(0.0) * 60.0).ok())
    }

    /// Reject settings that cannot drive a run
    pub fn validate(&self) -> Result<()> {
        self.scorer()?;
        Parallelism::from_n_jobs(self.n_jobs)?;

        if let Some(mins) = self.max_time_mins {
            if !mins.is_finite() || mins < 0.0 {
                return Err(MetaMlError::ConfigError(format!(
                    "max_time_mins must be a non-negative number, got {}",
                    mins
                )));
            }
            if Duration::try_from_secs_f64(mins * 60.0).is_err() {
                return Err(MetaMlError::ConfigError(format!(
                    "max_time_mins {} is too large for a time budget",
                    mins
                )));
            }
        }
        if self.stopping_criteria == Some(0) {
            return Err(MetaMlError::ConfigError(
                "stopping_criteria must be a positive integer".to_string(),
            ));
        }
        if self.ensemble == Some(0) {
            return Err(MetaMlError::ConfigError(
                "ensemble must be a positive integer".to_string(),
            ));
        }
        if self.cv_folds < 2 {
            return Err(MetaMlError::ConfigError(format!(
                "cv_folds must be at least 2, got {}",
                self.cv_folds
            )));
        }
        if self.knowledgebase.is_some() != self.kb_metafeatures.is_some() {
            return Err(MetaMlError::ConfigError(
                "a knowledgebase requires both its results and its metafeatures".to_string(),
            ));
        }
        Ok(())
    }
}
