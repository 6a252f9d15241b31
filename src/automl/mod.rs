//! AutoML orchestrator
//!
//! [`AutoMl`] owns a run end to end: it loads the catalog, builds or restores
//! a recommender, asks it for candidates, cross-validates them, feeds the
//! scores back and stops on time, iteration count or stagnation. The best
//! ledger entry, or a voting ensemble of the top ones, is then fitted on the
//! full data.

mod config;
mod engine;
mod logging;
mod stopping;

pub use config::AutoMlConfig;
pub use engine::{AutoMl, RunReport};
pub use logging::LogHandle;
pub use stopping::{StopReason, StoppingState, TimeBudget};
