//! metaml - meta-learning AutoML driver
//!
//! Given a tabular dataset, metaml repeatedly asks a recommender for
//! promising (algorithm, hyperparameter) candidates, scores them by k-fold
//! cross-validation, feeds the scores back into the recommender, and finally
//! fits the best configuration or a voting ensemble of the top ones.
//!
//! # Modules
//!
//! ## Orchestration
//! - [`automl`] - The optimization loop, configuration and stopping criteria
//!
//! ## Search space and history
//! - [`catalog`] - Algorithm definitions expanded into candidates
//! - [`knowledgebase`] - Historical results used to bootstrap recommenders
//! - [`ledger`] - Observations of the current run
//!
//! ## Recommendation
//! - [`recommender`] - Ranking strategies and persisted snapshots
//! - [`metafeatures`] - Dataset descriptors for nearest-dataset lookups
//!
//! ## Modelling
//! - [`estimators`] - Built-in estimators and the name-to-factory registry
//! - [`evaluation`] - Parallel cross-validation and scorers
//! - [`ensemble`] - Voting ensemble
//!
//! # Example
//!
//! ```no_run
//! use metaml::prelude::*;
//! use ndarray::{Array1, Array2};
//!
//! # fn main() -> metaml::Result<()> {
//! let x = Array2::<f64>::zeros((40, 3));
//! let y = Array1::<f64>::zeros(40);
//! let config = AutoMlConfig::new(Mode::Classification)
//!     .with_n_iters(5)
//!     .with_random_state(42);
//! let mut automl = AutoMl::new(config)?;
//! automl.fit(&x, &y)?;
//! println!("best: {:?}", automl.best_algorithm());
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

// Shared types
pub mod mode;
pub mod params;
pub mod dataset;

// Search space and history
pub mod catalog;
pub mod knowledgebase;
pub mod ledger;

// Recommendation
pub mod metafeatures;
pub mod recommender;

// Modelling
pub mod estimators;
pub mod evaluation;
pub mod ensemble;

// Orchestration
pub mod automl;

pub use error::{MetaMlError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{MetaMlError, Result};

    // Orchestration
    pub use crate::automl::{AutoMl, AutoMlConfig, LogHandle, RunReport, StopReason};

    // Shared types
    pub use crate::dataset::DatasetDescriptor;
    pub use crate::mode::Mode;
    pub use crate::params::{ParamMap, ParamValue};

    // Search space and history
    pub use crate::catalog::{AlgorithmDefinition, Candidate, Catalog};
    pub use crate::knowledgebase::Knowledgebase;
    pub use crate::ledger::{Observation, ResultsLedger};

    // Recommendation
    pub use crate::metafeatures::{MetafeatureProvider, Metafeatures, StatisticalMetafeatures};
    pub use crate::recommender::{
        AverageRecommender, KnnMetaRecommender, RandomRecommender, Recommender, RecommenderConfig,
        RecommenderKind, RecommenderSnapshot, ResultSource,
    };

    // Modelling
    pub use crate::ensemble::VotingEnsemble;
    pub use crate::estimators::{Estimator, EstimatorRegistry};
    pub use crate::evaluation::{CandidateEvaluator, EvaluationEngine, EvaluationOutcome, Scorer};
}
