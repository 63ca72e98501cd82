//! Per-operation failure logging with a warning window.
//!
//! A spool on a full or read-only disk fails on every write and every poll.
//! Each [`OperationLogger`] tracks one operation ("persist", "load", "purge")
//! and emits at most one warning per window. Failures inside the window are
//! counted and the count is attached to the next warning. A later success
//! logs a single recovery line and resets the window.
//!
//! With `suppress_warnings` every line drops to `debug`; used for internal
//! spools whose failures must not reach the application's log.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::StorageError;

#[derive(Debug, Default)]
struct LoggerState {
    last_warning: Option<Instant>,
    suppressed: u64,
    failing: bool,
}

/// Rate-limited success/failure logger for one storage operation.
#[derive(Debug)]
pub struct OperationLogger {
    operation: &'static str,
    interval: Duration,
    suppress_warnings: bool,
    state: Mutex<LoggerState>,
}

impl OperationLogger {
    pub fn new(operation: &'static str, interval: Duration, suppress_warnings: bool) -> Self {
        OperationLogger {
            operation,
            interval,
            suppress_warnings,
            state: Mutex::new(LoggerState::default()),
        }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    fn state(&self) -> MutexGuard<'_, LoggerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Note a success. Logs once if the operation had been failing.
    pub fn record_success(&self) {
        let suppressed = {
            let mut state = self.state();
            if !state.failing {
                return;
            }
            state.failing = false;
            state.last_warning = None;
            std::mem::take(&mut state.suppressed)
        };

        if self.suppress_warnings {
            debug!(op = self.operation, suppressed, "operation recovered");
        } else {
            info!(op = self.operation, suppressed, "operation recovered");
        }
    }

    /// Note a failure. Returns true if a warning was emitted.
    pub fn record_failure(&self, message: &str, error: &StorageError) -> bool {
        let path = error.path().map(|p| p.display().to_string());
        let suppressed = {
            let mut state = self.state();
            state.failing = true;
            let due = state
                .last_warning
                .map_or(true, |at| at.elapsed() >= self.interval);
            if !due {
                state.suppressed += 1;
                drop(state);
                debug!(
                    op = self.operation,
                    kind = %error.kind(),
                    path = ?path,
                    error = %error,
                    "{} (rate limited)",
                    message
                );
                return false;
            }
            state.last_warning = Some(Instant::now());
            std::mem::take(&mut state.suppressed)
        };

        if self.suppress_warnings {
            debug!(
                op = self.operation,
                kind = %error.kind(),
                path = ?path,
                suppressed,
                error = %error,
                "{}",
                message
            );
            return false;
        }

        warn!(
            op = self.operation,
            kind = %error.kind(),
            path = ?path,
            suppressed,
            error = %error,
            "{}",
            message
        );
        true
    }
}
