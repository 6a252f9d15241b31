//! The optimization loop
//!
//! ```text
//! INIT -> (ITERATE -> EVALUATE -> UPDATE -> CHECK_STOP)* -> FINALIZE
//! ```

use super::config::AutoMlConfig;
use super::logging::LogHandle;
use super::stopping::{StopReason, StoppingState, TimeBudget};
use crate::catalog::{Candidate, Catalog};
use crate::dataset::{default_feature_names, from_dataframe, columns_to_array2, validate_xy, DatasetDescriptor};
use crate::ensemble::VotingEnsemble;
use crate::error::{MetaMlError, Result};
use crate::estimators::{Estimator, EstimatorRegistry};
use crate::evaluation::{CandidateEvaluator, EvaluationEngine, EvaluationOutcome, Parallelism, Scorer};
use crate::knowledgebase::Knowledgebase;
use crate::ledger::{Observation, ResultsLedger};
use crate::metafeatures::{MetafeatureProvider, StatisticalMetafeatures};
use crate::params::{parameter_key, ParamMap};
use crate::recommender::{Recommender, RecommenderConfig, RecommenderSnapshot, ResultSource};
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Summary of the last `fit`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Iterations that ran to completion
    pub iterations: usize,
    pub stop_reason: StopReason,
    pub n_evaluated: usize,
    pub n_failed: usize,
    pub best_score: Option<f64>,
}

/// Recommend, cross-validate and learn until a stopping criterion fires,
/// then fit the best configuration (or an ensemble of the top ones)
pub struct AutoMl {
    config: AutoMlConfig,
    scorer: Scorer,
    log: LogHandle,
    registry: Arc<EstimatorRegistry>,
    metafeature_provider: Arc<dyn MetafeatureProvider>,
    catalog: Option<Catalog>,
    knowledgebase: Option<Knowledgebase>,
    evaluator: Option<Arc<dyn CandidateEvaluator>>,
    /// Supplied by the caller; consumed by the next `fit`
    custom_recommender: Option<Box<dyn Recommender>>,

    recommender: Option<Box<dyn Recommender>>,
    ledger: ResultsLedger,
    descriptor: Option<DatasetDescriptor>,
    feature_names: Vec<String>,
    best: Option<Observation>,
    model: Option<Box<dyn Estimator>>,
    report: Option<RunReport>,
}

impl std::fmt::Debug for AutoMl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoMl")
            .field("config", &self.config)
            .field("scorer", &self.scorer)
            .field("ledger_len", &self.ledger.len())
            .field("best", &self.best)
            .field("fitted", &self.model.is_some())
            .finish()
    }
}

impl AutoMl {
    /// Validate the configuration; nothing is loaded until `fit`
    pub fn new(config: AutoMlConfig) -> Result<Self> {
        config.validate()?;
        let scorer = config.scorer()?;
        let log = LogHandle::from_verbosity(config.verbosity);
        Ok(Self {
            config,
            scorer,
            log,
            registry: Arc::new(EstimatorRegistry::with_builtin()),
            metafeature_provider: Arc::new(StatisticalMetafeatures::new()),
            catalog: None,
            knowledgebase: None,
            evaluator: None,
            custom_recommender: None,
            recommender: None,
            ledger: ResultsLedger::new(),
            descriptor: None,
            feature_names: Vec::new(),
            best: None,
            model: None,
            report: None,
        })
    }

    /// Use an already-loaded catalog instead of `algorithm_catalog`
    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Bootstrap from an in-memory knowledgebase instead of the configured files
    pub fn with_knowledgebase(mut self, knowledgebase: Knowledgebase) -> Self {
        self.knowledgebase = Some(knowledgebase);
        self
    }

    pub fn with_registry(mut self, registry: Arc<EstimatorRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Use a caller-built recommender for the next `fit`. Its metric and
    /// mode must match the run.
    pub fn with_custom_recommender(mut self, recommender: Box<dyn Recommender>) -> Self {
        self.custom_recommender = Some(recommender);
        self
    }

    /// Replace the cross-validation engine
    pub fn with_evaluator(mut self, evaluator: Arc<dyn CandidateEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn with_metafeature_provider(mut self, provider: Arc<dyn MetafeatureProvider>) -> Self {
        self.metafeature_provider = provider;
        self
    }

    pub fn with_log_handle(mut self, log: LogHandle) -> Self {
        self.log = log;
        self
    }

    pub fn config(&self) -> &AutoMlConfig {
        &self.config
    }

    pub fn scorer(&self) -> Scorer {
        self.scorer
    }

    /// Every successful observation of the last run, in evaluation order
    pub fn ledger(&self) -> &ResultsLedger {
        &self.ledger
    }

    /// Top ledger entry of the last run
    pub fn best(&self) -> Option<&Observation> {
        self.best.as_ref()
    }

    pub fn best_algorithm(&self) -> Option<&str> {
        self.best.as_ref().map(|b| b.algorithm.as_str())
    }

    pub fn best_parameters(&self) -> Option<&ParamMap> {
        self.best.as_ref().map(|b| &b.parameters)
    }

    pub fn descriptor(&self) -> Option<&DatasetDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn report(&self) -> Option<&RunReport> {
        self.report.as_ref()
    }

    pub fn recommender(&self) -> Option<&dyn Recommender> {
        self.recommender.as_deref()
    }

    /// The finalized estimator
    pub fn model(&self) -> Option<&dyn Estimator> {
        self.model.as_deref()
    }

    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    /// Run the optimization loop on `x`, `y` and fit the selected model
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let log = self.log.clone();
        log.in_scope(|| self.run(x, y, default_feature_names(x.ncols())))
    }

    /// Fit from a DataFrame holding the features and a `target` column
    pub fn fit_dataframe(&mut self, df: &DataFrame, target: &str) -> Result<()> {
        let (x, y, names) = from_dataframe(df, target)?;
        let log = self.log.clone();
        log.in_scope(|| self.run(&x, &y, names))
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let model = self.model.as_ref().ok_or(MetaMlError::ModelNotFitted)?;
        model.predict(x)
    }

    /// Predict from a DataFrame with the columns seen by `fit_dataframe`
    pub fn predict_dataframe(&self, df: &DataFrame) -> Result<Array1<f64>> {
        if self.model.is_none() {
            return Err(MetaMlError::ModelNotFitted);
        }
        let x = columns_to_array2(df, &self.feature_names)?;
        self.predict(&x)
    }

    /// The configured metric of the fitted model on `x`, `y`
    pub fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let y_pred = self.predict(x)?;
        self.scorer.score(y, &y_pred)
    }

    /// Persist the trained recommender for a later run
    pub fn save_recommender(&self, path: impl AsRef<Path>) -> Result<()> {
        let recommender = self.recommender.as_ref().ok_or_else(|| {
            MetaMlError::RecommenderError("no recommender yet, call fit first".to_string())
        })?;
        recommender.snapshot()?.save(path)
    }

    fn run(&mut self, x: &Array2<f64>, y: &Array1<f64>, feature_names: Vec<String>) -> Result<()> {
        // INIT
        validate_xy(x, y)?;
        let started_at = Utc::now();
        let budget = TimeBudget::start(self.config.max_time());
        let mode = self.config.mode;
        let metric = self.scorer.kb_metric_key();

        self.ledger = ResultsLedger::new();
        self.best = None;
        self.model = None;
        self.report = None;
        self.feature_names = feature_names;

        let catalog = self.load_catalog()?;
        let pool = catalog.candidates().to_vec();
        if pool.is_empty() {
            return Err(MetaMlError::Exhausted(format!(
                "no algorithms available for {} mode",
                mode
            )));
        }

        let evaluator = self.build_evaluator()?;
        if evaluator.metric_key() != metric {
            return Err(MetaMlError::ConfigError(format!(
                "evaluator reports '{}' but the run metric is '{}'",
                evaluator.metric_key(),
                metric
            )));
        }

        let descriptor = DatasetDescriptor::describe(x, y, mode, self.metafeature_provider.as_ref())?;
        info!(
            dataset = %descriptor.id,
            n_samples = x.nrows(),
            n_features = x.ncols(),
            mode = %mode,
            metric = metric,
            "Starting AutoML run"
        );

        let mut recommender = self.prepare_recommender(pool)?;
        self.descriptor = Some(descriptor.clone());

        let n_recs = self.config.effective_n_recs();
        let mut stopping = StoppingState::new(self.config.stopping_criteria);
        let mut stop_reason = StopReason::IterationBudget;
        let mut iterations = 0;
        let mut n_failed = 0;

        for iteration in 1..=self.config.n_iters {
            if budget.exhausted() {
                info!(iteration, elapsed = ?budget.elapsed(), "Time budget exhausted, stopping");
                stop_reason = StopReason::TimeBudget;
                break;
            }

            // ITERATE
            let recs = recommender.recommend(&descriptor.id, n_recs, &descriptor.metafeatures)?;
            let batch: Vec<Candidate> = recs
                .algorithms
                .iter()
                .zip(&recs.parameters)
                .map(|(algorithm, parameters)| resolve_candidate(&catalog, algorithm, parameters))
                .collect();
            debug!(iteration, n_candidates = batch.len(), "Evaluating recommendations");

            // EVALUATE
            let outcomes = evaluator.evaluate(&batch, &descriptor.id, x, y)?;
            let mut observations = Vec::with_capacity(outcomes.len());
            for outcome in outcomes {
                match outcome {
                    EvaluationOutcome::Scored(obs) if obs.value.is_finite() && obs.dataset_id == descriptor.id => {
                        observations.push(obs)
                    }
                    EvaluationOutcome::Scored(obs) => {
                        n_failed += 1;
                        warn!(
                            algorithm = %obs.algorithm,
                            parameters = %parameter_key(&obs.parameters),
                            value = obs.value,
                            "Discarding unusable observation"
                        );
                    }
                    EvaluationOutcome::Failed {
                        algorithm,
                        parameters,
                        reason,
                    } => {
                        n_failed += 1;
                        warn!(
                            algorithm = %algorithm,
                            parameters = %parameter_key(&parameters),
                            reason = %reason,
                            "Candidate evaluation failed"
                        );
                    }
                }
            }

            // UPDATE
            self.ledger.append(&observations);
            if !observations.is_empty() {
                recommender.update(&observations, std::slice::from_ref(&descriptor), ResultSource::Live)?;
            }
            iterations = iteration;

            let iteration_best = observations.iter().map(|o| o.value).reduce(f64::max);
            info!(
                iteration,
                n_scored = observations.len(),
                iteration_best = ?iteration_best,
                best = ?self.ledger.best().map(|b| b.value),
                "Iteration complete"
            );

            // CHECK_STOP
            if budget.exhausted() {
                info!(iteration, elapsed = ?budget.elapsed(), "Time budget exhausted, stopping");
                stop_reason = StopReason::TimeBudget;
                break;
            }
            if iteration == self.config.n_iters {
                break;
            }
            if stopping.observe(iteration_best) {
                info!(
                    iteration,
                    stagnant = stopping.stagnant_iterations(),
                    "Stopping criteria reached, no improvement"
                );
                stop_reason = StopReason::Stagnation;
                break;
            }
        }

        self.recommender = Some(recommender);
        self.report = Some(RunReport {
            started_at,
            finished_at: Utc::now(),
            iterations,
            stop_reason,
            n_evaluated: self.ledger.len(),
            n_failed,
            best_score: self.ledger.best().map(|b| b.value),
        });

        // FINALIZE
        self.finalize(&catalog, x, y)
    }

    fn finalize(&mut self, catalog: &Catalog, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let best = self
            .ledger
            .best()
            .cloned()
            .ok_or_else(|| MetaMlError::Exhausted("no candidate was evaluated successfully".to_string()))?;
        let seed = self.config.random_state;

        let mut model: Box<dyn Estimator> = match self.config.ensemble {
            Some(n) => {
                let top = self.ledger.top(n);
                let members = top
                    .iter()
                    .map(|obs| {
                        let candidate = resolve_candidate(catalog, &obs.algorithm, &obs.parameters);
                        self.registry.instantiate(&candidate, seed)
                    })
                    .collect::<Result<Vec<_>>>()?;
                info!(
                    n_members = members.len(),
                    members = ?top.iter().map(|o| o.algorithm.as_str()).collect::<Vec<_>>(),
                    "Fitting voting ensemble"
                );
                Box::new(VotingEnsemble::new(self.config.mode, members)?)
            }
            None => {
                let candidate = resolve_candidate(catalog, &best.algorithm, &best.parameters);
                self.registry.instantiate(&candidate, seed)?
            }
        };

        Parallelism::from_n_jobs(self.config.n_jobs)?.install(|| model.fit(x, y))??;
        info!(
            algorithm = %best.algorithm,
            parameters = %parameter_key(&best.parameters),
            score = best.value,
            "Selected best configuration"
        );
        self.best = Some(best);
        self.model = Some(model);
        Ok(())
    }

    /// Explicit catalog, configured file, or the built-in one; algorithms
    /// the registry cannot build are dropped
    fn load_catalog(&self) -> Result<Catalog> {
        let mut catalog = match (&self.catalog, &self.config.algorithm_catalog) {
            (Some(catalog), _) => catalog.clone(),
            (None, Some(path)) => Catalog::load(path, self.config.mode)?,
            (None, None) => Catalog::builtin(self.config.mode)?,
        };
        if catalog.mode() != self.config.mode {
            return Err(MetaMlError::ConfigError(format!(
                "catalog was built for {} mode but the run mode is {}",
                catalog.mode(),
                self.config.mode
            )));
        }

        let registry = Arc::clone(&self.registry);
        let removed = catalog.retain_algorithms(|d| registry.contains(&d.name));
        for name in &removed {
            warn!(algorithm = %name, "No estimator registered under this name, algorithm dropped");
        }
        Ok(catalog)
    }

    fn build_evaluator(&self) -> Result<Arc<dyn CandidateEvaluator>> {
        if let Some(evaluator) = &self.evaluator {
            return Ok(Arc::clone(evaluator));
        }
        let engine = EvaluationEngine::new(Arc::clone(&self.registry), self.scorer)
            .with_cv_folds(self.config.cv_folds)
            .with_n_jobs(self.config.n_jobs)?
            .with_random_state(self.config.random_state);
        Ok(Arc::new(engine))
    }

    fn load_knowledgebase(&self) -> Result<Option<Knowledgebase>> {
        if let Some(kb) = &self.knowledgebase {
            return Ok(Some(kb.clone()));
        }
        match (&self.config.knowledgebase, &self.config.kb_metafeatures) {
            (Some(results), Some(metafeatures)) => Ok(Some(Knowledgebase::load(
                results,
                metafeatures,
                self.config.mode,
                self.scorer.kb_metric_key(),
            )?)),
            (None, None) => Ok(None),
            _ => Err(MetaMlError::ConfigError(
                "a knowledgebase requires both its results and its metafeatures".to_string(),
            )),
        }
    }

    /// Serialized recommender if configured (no bootstrap), else the caller's
    /// recommender or a fresh built-in one, bootstrapped from the knowledgebase
    fn prepare_recommender(&mut self, pool: Vec<Candidate>) -> Result<Box<dyn Recommender>> {
        let metric = self.scorer.kb_metric_key();
        let mode = self.config.mode;

        if let Some(path) = &self.config.serialized_recommender {
            let snapshot = RecommenderSnapshot::load(path)?;
            snapshot.check_compatible(metric, mode)?;
            let recommender = snapshot.restore()?;
            info!(
                recommender = recommender.name(),
                path = %path.display(),
                "Loaded serialized recommender, skipping knowledgebase bootstrap"
            );
            return Ok(recommender);
        }

        let mut recommender = match self.custom_recommender.take() {
            Some(rec) => {
                let rc = rec.config();
                if rc.metric != metric || rc.mode != mode {
                    return Err(MetaMlError::ConfigError(format!(
                        "recommender ranks by '{}' in {} mode, this run uses '{}' in {} mode",
                        rc.metric, rc.mode, metric, mode
                    )));
                }
                rec
            }
            None => self.config.recommender.build(
                RecommenderConfig::new(metric, mode, pool).with_random_state(self.config.random_state),
            )?,
        };

        if let Some(kb) = self.load_knowledgebase()? {
            info!(
                recommender = recommender.name(),
                n_results = kb.len(),
                n_datasets = kb.descriptors().len(),
                "Bootstrapping recommender from knowledgebase"
            );
            recommender.update(kb.results(), kb.descriptors(), ResultSource::Knowledgebase)?;
        }
        Ok(recommender)
    }
}

/// The catalog's candidate for a recommendation, or a bare candidate carrying
/// the algorithm's static parameters when the pair is not enumerated
fn resolve_candidate(catalog: &Catalog, algorithm: &str, parameters: &ParamMap) -> Candidate {
    match catalog.find(algorithm, parameters) {
        Some(candidate) => candidate.clone(),
        None => Candidate::new(algorithm, catalog.mode(), parameters.clone())
            .with_static_parameters(catalog.static_parameters(algorithm).cloned().unwrap_or_default()),
    }
}
