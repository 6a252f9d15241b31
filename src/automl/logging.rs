//! Run-scoped logging

use tracing::{Dispatch, Level};

/// Logging handle owned by an [`AutoMl`](super::AutoMl) instance. Events
/// emitted while a run is in scope go to this handle's subscriber rather
/// than the process-wide default.
#[derive(Debug, Clone)]
pub struct LogHandle {
    dispatch: Dispatch,
    level: Level,
}

impl LogHandle {
    /// Formatter writing to stderr: 0 logs errors only, 1 progress, 2+ debug
    pub fn from_verbosity(verbosity: u8) -> Self {
        let level = match verbosity {
            0 => Level::ERROR,
            1 => Level::INFO,
            _ => Level::DEBUG,
        };
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();
        Self {
            dispatch: Dispatch::new(subscriber),
            level,
        }
    }

    /// Route events to a caller-supplied dispatcher
    pub fn from_dispatch(dispatch: Dispatch, level: Level) -> Self {
        Self { dispatch, level }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    /// Run `f` with this handle as the thread's default dispatcher
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(LogHandle::from_verbosity(0).level(), Level::ERROR);
        assert_eq!(LogHandle::from_verbosity(1).level(), Level::INFO);
        assert_eq!(LogHandle::from_verbosity(5).level(), Level::DEBUG);
    }

    #[test]
    fn test_in_scope_returns_value() {
        let handle = LogHandle::from_verbosity(0);
        assert_eq!(handle.in_scope(|| 41 + 1), 42);
    }
}
