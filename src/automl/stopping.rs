//! Stopping criteria of the optimization loop

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Why the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    IterationBudget,
    TimeBudget,
    Stagnation,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::IterationBudget => "iteration budget reached",
            StopReason::TimeBudget => "time budget exhausted",
            StopReason::Stagnation => "no improvement",
        })
    }
}

/// Best score so far and the count of consecutive non-improving iterations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoppingState {
    threshold: Option<usize>,
    best: Option<f64>,
    stagnant: usize,
}

impl StoppingState {
    pub fn new(threshold: Option<usize>) -> Self {
        Self {
            threshold,
            best: None,
            stagnant: 0,
        }
    }

    /// Record the best score of an iteration (`None` if nothing scored) and
    /// return whether the stagnation threshold has been reached
    pub fn observe(&mut self, iteration_best: Option<f64>) -> bool {
        match (iteration_best, self.best) {
            (Some(score), Some(best)) if score <= best => self.stagnant += 1,
            (Some(score), _) => {
                self.best = Some(score);
                self.stagnant = 0;
            }
            (None, _) => self.stagnant += 1,
        }
        self.threshold.map_or(false, |t| self.stagnant >= t)
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn stagnant_iterations(&self) -> usize {
        self.stagnant
    }
}

/// Wall-clock budget measured from the start of a run
#[derive(Debug, Clone, Copy)]
pub struct TimeBudget {
    start: Instant,
    limit: Option<Duration>,
}

impl TimeBudget {
    pub fn start(limit: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            limit,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn exhausted(&self) -> bool {
        self.limit.map_or(false, |limit| self.elapsed() >= limit)
    }
}
