//! Evaluation engine
//!
//! Scores a batch of candidates by k-fold cross-validation. Candidates are
//! independent; the batch fans out over a rayon pool sized by `n_jobs`,
//! estimators' own rayon work included, and results come back in input order. A candidate whose construction, fit or
//! scoring fails is reported as [`EvaluationOutcome::Failed`] and the rest of
//! the batch carries on.

mod cross_validation;
mod scoring;

pub use cross_validation::{CVResults, CVSplit, CVStrategy, CrossValidator};
pub use scoring::Scorer;

use crate::catalog::Candidate;
use crate::error::{MetaMlError, Result};
use crate::estimators::EstimatorRegistry;
use crate::ledger::Observation;
use crate::mode::Mode;
use crate::params::{parameter_key, ParamMap};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, dispatcher};

/// Default number of cross-validation folds
pub const DEFAULT_CV_FOLDS: usize = 10;

/// Result of evaluating one candidate
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    Scored(Observation),
    Failed {
        algorithm: String,
        parameters: ParamMap,
        reason: String,
    },
}

impl EvaluationOutcome {
    pub fn is_scored(&self) -> bool {
        matches!(self, EvaluationOutcome::Scored(_))
    }

    pub fn observation(&self) -> Option<&Observation> {
        match self {
            EvaluationOutcome::Scored(obs) => Some(obs),
            EvaluationOutcome::Failed { .. } => None,
        }
    }

    pub fn into_observation(self) -> Option<Observation> {
        match self {
            EvaluationOutcome::Scored(obs) => Some(obs),
            EvaluationOutcome::Failed { .. } => None,
        }
    }
}

/// Scores batches of candidates on a dataset
pub trait CandidateEvaluator: Send + Sync {
    /// Knowledgebase key that produced observations are tagged with
    fn metric_key(&self) -> &str;

    /// Evaluate every candidate; the output has one outcome per input, in order.
    /// An `Err` means the whole batch could not run (e.g. too few samples).
    fn evaluate(
        &self,
        candidates: &[Candidate],
        dataset_id: &str,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<Vec<EvaluationOutcome>>;
}

/// Worker count for a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    /// The global rayon pool
    AllCores,
    Threads(usize),
}

impl Parallelism {
    /// `1` runs sequentially, `-1` uses every core; `0` and anything below `-1` are rejected
    pub fn from_n_jobs(n_jobs: i32) -> Result<Self> {
        match n_jobs {
            1 => Ok(Parallelism::Sequential),
            -1 => Ok(Parallelism::AllCores),
            n if n > 1 => Ok(Parallelism::Threads(n as usize)),
            n => Err(MetaMlError::ConfigError(format!(
                "n_jobs must be -1 or a positive integer, got {}",
                n
            ))),
        }
    }

    /// Run `op` inside a pool of this size so nested rayon work stays bounded.
    /// `op` sees the caller's tracing dispatcher.
    pub fn install<OP, R>(&self, op: OP) -> Result<R>
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        let threads = match *self {
            Parallelism::AllCores => return Ok(op()),
            Parallelism::Sequential => 1,
            Parallelism::Threads(n) => n,
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| MetaMlError::TrainingError(format!("Thread pool error: {}", e)))?;
        let dispatch = dispatcher::get_default(|d| d.clone());
        Ok(pool.install(|| dispatcher::with_default(&dispatch, op)))
    }
}

/// Cross-validation evaluator backed by an [`EstimatorRegistry`]
#[derive(Debug, Clone)]
pub struct EvaluationEngine {
    registry: Arc<EstimatorRegistry>,
    scorer: Scorer,
    cv_folds: usize,
    parallelism: Parallelism,
    random_state: Option<u64>,
}

impl EvaluationEngine {
    pub fn new(registry: Arc<EstimatorRegistry>, scorer: Scorer) -> Self {
        Self {
            registry,
            scorer,
            cv_folds: DEFAULT_CV_FOLDS,
            parallelism: Parallelism::Sequential,
            random_state: None,
        }
    }

    pub fn with_cv_folds(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    pub fn with_n_jobs(mut self, n_jobs: i32) -> Result<Self> {
        self.parallelism = Parallelism::from_n_jobs(n_jobs)?;
        Ok(self)
    }

    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    pub fn scorer(&self) -> Scorer {
        self.scorer
    }

    pub fn parallelism(&self) -> Parallelism {
        self.parallelism
    }

    /// Stratified folds for classification, contiguous folds for regression
    fn splitter(&self) -> CrossValidator {
        let strategy = match self.scorer.mode() {
            Mode::Classification => CVStrategy::StratifiedKFold { n_splits: self.cv_folds },
            Mode::Regression => CVStrategy::KFold { n_splits: self.cv_folds },
        };
        CrossValidator::new(strategy)
    }

    /// Mean fold score of one candidate
    pub fn cross_validate(
        &self,
        candidate: &Candidate,
        splits: &[CVSplit],
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<CVResults> {
        let mut scores = Vec::with_capacity(splits.len());
        for split in splits {
            let mut estimator = self.registry.instantiate(candidate, self.random_state)?;
            let x_train = x.select(Axis(0), &split.train_indices);
            let y_train = y.select(Axis(0), &split.train_indices);
            let x_test = x.select(Axis(0), &split.test_indices);
            let y_test = y.select(Axis(0), &split.test_indices);

            estimator.fit(&x_train, &y_train)?;
            let y_pred = estimator.predict(&x_test)?;
            scores.push(self.scorer.score(&y_test, &y_pred)?);
        }
        Ok(CVResults::from_scores(scores))
    }

    fn evaluate_one(
        &self,
        candidate: &Candidate,
        dataset_id: &str,
        splits: &[CVSplit],
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> EvaluationOutcome {
        let failed = |reason: String| {
            debug!(
                algorithm = %candidate.algorithm,
                parameters = %parameter_key(&candidate.parameters),
                reason = %reason,
                "Candidate evaluation failed"
            );
            EvaluationOutcome::Failed {
                algorithm: candidate.algorithm.clone(),
                parameters: candidate.parameters.clone(),
                reason,
            }
        };

        match self.cross_validate(candidate, splits, x, y) {
            Ok(cv) if cv.mean_score.is_finite() => {
                debug!(
                    algorithm = %candidate.algorithm,
                    parameters = %parameter_key(&candidate.parameters),
                    score = cv.mean_score,
                    std = cv.std_score,
                    "Candidate evaluated"
                );
                EvaluationOutcome::Scored(Observation::new(
                    dataset_id,
                    candidate.algorithm.clone(),
                    candidate.parameters.clone(),
                    self.scorer.kb_metric_key(),
                    cv.mean_score,
                ))
            }
            Ok(cv) => failed(format!("non-finite mean score {}", cv.mean_score)),
            Err(e) => failed(e.to_string()),
        }
    }
}

impl CandidateEvaluator for EvaluationEngine {
    fn metric_key(&self) -> &str {
        self.scorer.kb_metric_key()
    }

    fn evaluate(
        &self,
        candidates: &[Candidate],
        dataset_id: &str,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<Vec<EvaluationOutcome>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let splits = self.splitter().split(y)?;
        // rayon workers do not inherit the caller's dispatcher
        let dispatch = dispatcher::get_default(|d| d.clone());
        self.parallelism.install(|| {
            candidates
                .par_iter()
                .map(|c| dispatcher::with_default(&dispatch, || self.evaluate_one(c, dataset_id, &splits, x, y)))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::Estimator;
    use crate::params::ParamValue;
    use rayon::prelude::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::thread::ThreadId;

    fn two_class_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| {
            let class = (i % 2) as f64;
            class * 3.0 + ((i * 7 + j * 3) % 5) as f64 * 0.2
        });
        let y = Array1::from_shape_fn(40, |i| (i % 2) as f64);
        (x, y)
    }

    fn candidate(alg: &str, params: &[(&str, ParamValue)]) -> Candidate {
        Candidate::new(
            alg,
            Mode::Classification,
            params.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        )
    }

    fn engine(n_jobs: i32) -> EvaluationEngine {
        EvaluationEngine::new(Arc::new(EstimatorRegistry::with_builtin()), Scorer::Accuracy)
            .with_cv_folds(5)
            .with_n_jobs(n_jobs)
            .unwrap()
            .with_random_state(Some(0))
    }

    #[test]
    fn test_failures_are_isolated_and_positional() {
        let (x, y) = two_class_data();
        let batch = vec![
            candidate("KNeighborsClassifier", &[("n_neighbors", ParamValue::Int(3))]),
            candidate("KNeighborsClassifier", &[("n_neighbors", ParamValue::Int(500))]),
            candidate("NoSuchAlgorithm", &[]),
            candidate("DecisionTreeClassifier", &[("max_depth", ParamValue::from("None"))]),
        ];

        let outcomes = engine(1).evaluate(&batch, "d1", &x, &y).unwrap();
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes[0].is_scored());
        assert!(!outcomes[1].is_scored());
        assert!(!outcomes[2].is_scored());
        assert!(outcomes[3].is_scored());

        let obs = outcomes[3].observation().unwrap();
        assert_eq!(obs.dataset_id, "d1");
        assert_eq!(obs.metric, "accuracy");
        assert_eq!(obs.parameters["max_depth"], ParamValue::from("None"));
        assert!((0.0..=1.0).contains(&obs.value));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (x, y) = two_class_data();
        let batch: Vec<Candidate> = (1..=4)
            .map(|k| candidate("KNeighborsClassifier", &[("n_neighbors", ParamValue::Int(k))]))
            .chain(std::iter::once(candidate("GaussianNB", &[])))
            .collect();

        let seq = engine(1).evaluate(&batch, "d", &x, &y).unwrap();
        let par = engine(3).evaluate(&batch, "d", &x, &y).unwrap();
        let all = engine(-1).evaluate(&batch, "d", &x, &y).unwrap();
        assert_eq!(seq, par);
        assert_eq!(seq, all);
    }

    #[test]
    fn test_too_few_samples_fails_batch() {
        let x = Array2::zeros((3, 1));
        let y = Array1::from_vec(vec![0.0, 1.0, 0.0]);
        let batch = vec![candidate("GaussianNB", &[])];
        let result = engine(1).with_cv_folds(10).evaluate(&batch, "d", &x, &y);
        assert!(matches!(result, Err(MetaMlError::ValidationError(_))));
    }

    #[test]
    fn test_n_jobs_validation() {
        assert_eq!(Parallelism::from_n_jobs(1).unwrap(), Parallelism::Sequential);
        assert_eq!(Parallelism::from_n_jobs(-1).unwrap(), Parallelism::AllCores);
        assert_eq!(Parallelism::from_n_jobs(4).unwrap(), Parallelism::Threads(4));
        assert!(Parallelism::from_n_jobs(0).is_err());
        assert!(Parallelism::from_n_jobs(-2).is_err());
    }

    /// Records the threads its fit fans out to
    #[derive(Debug)]
    struct ThreadRecorder {
        seen: Arc<Mutex<HashSet<ThreadId>>>,
    }

    impl Estimator for ThreadRecorder {
        fn name(&self) -> &str {
            "ThreadRecorder"
        }

        fn set_param(&mut self, _name: &str, _value: &ParamValue) -> Result<()> {
            Ok(())
        }

        fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
            let ids: Vec<ThreadId> = (0..256)
                .into_par_iter()
                .map(|_| {
                    std::thread::sleep(std::time::Duration::from_micros(50));
                    std::thread::current().id()
                })
                .collect();
            self.seen.lock().unwrap().extend(ids);
            Ok(())
        }

        fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
            Ok(Array1::zeros(x.nrows()))
        }
    }

    fn distinct_fit_threads(n_jobs: i32) -> usize {
        let seen = Arc::new(Mutex::new(HashSet::new()));
        let mut registry = EstimatorRegistry::new();
        let recorder_seen = Arc::clone(&seen);
        registry.register("ThreadRecorder", move || {
            Box::new(ThreadRecorder {
                seen: Arc::clone(&recorder_seen),
            })
        });
        let engine = EvaluationEngine::new(Arc::new(registry), Scorer::Accuracy)
            .with_cv_folds(2)
            .with_n_jobs(n_jobs)
            .unwrap();
        let (x, y) = two_class_data();
        let batch = vec![candidate("ThreadRecorder", &[]), candidate("ThreadRecorder", &[])];
        let outcomes = engine.evaluate(&batch, "d", &x, &y).unwrap();
        assert!(outcomes.iter().all(|o| o.is_scored()));
        let n = seen.lock().unwrap().len();
        n
    }

    #[test]
    fn test_n_jobs_bounds_nested_estimator_threads() {
        assert_eq!(distinct_fit_threads(1), 1);
        assert!(distinct_fit_threads(2) <= 2);
    }

    /// Records whether the run's dispatcher is active when it is fit
    #[derive(Debug)]
    struct DispatchRecorder {
        seen: Arc<Mutex<Vec<bool>>>,
    }

    impl Estimator for DispatchRecorder {
        fn name(&self) -> &str {
            "DispatchRecorder"
        }

        fn set_param(&mut self, _name: &str, _value: &ParamValue) -> Result<()> {
            Ok(())
        }

        fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
            let active = dispatcher::get_default(|d| d.is::<tracing_subscriber::Registry>());
            self.seen.lock().unwrap().push(active);
            Ok(())
        }

        fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
            Ok(Array1::zeros(x.nrows()))
        }
    }

    #[test]
    fn test_workers_log_to_callers_dispatcher() {
        for n_jobs in [1, 3, -1] {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let mut registry = EstimatorRegistry::new();
            let recorder_seen = Arc::clone(&seen);
            registry.register("DispatchRecorder", move || {
                Box::new(DispatchRecorder {
                    seen: Arc::clone(&recorder_seen),
                })
            });
            let engine = EvaluationEngine::new(Arc::new(registry), Scorer::Accuracy)
                .with_cv_folds(2)
                .with_n_jobs(n_jobs)
                .unwrap();
            let (x, y) = two_class_data();
            let batch: Vec<Candidate> = (0..6).map(|_| candidate("DispatchRecorder", &[])).collect();

            let run_dispatch = tracing::Dispatch::new(tracing_subscriber::registry());
            dispatcher::with_default(&run_dispatch, || engine.evaluate(&batch, "d", &x, &y)).unwrap();

            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 12);
            assert!(seen.iter().all(|&active| active), "n_jobs = {}", n_jobs);
        }
    }

    #[test]
    fn test_install_runs_on_bounded_pool() {
        let ids: HashSet<ThreadId> = Parallelism::Sequential
            .install(|| (0..64).into_par_iter().map(|_| std::thread::current().id()).collect::<Vec<_>>())
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(ids.len(), 1);
        assert_eq!(Parallelism::Threads(3).install(|| 7).unwrap(), 7);
    }

    #[test]
    fn test_empty_batch() {
        let (x, y) = two_class_data();
        assert!(engine(1).evaluate(&[], "d", &x, &y).unwrap().is_empty());
    }
}
