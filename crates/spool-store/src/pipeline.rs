//! Boundary with the HTTP delivery pipeline.
//!
//! The spool never talks HTTP itself. It hands payloads to a
//! [`DeliveryPipeline`], waits on the returned [`DeliveryHandle`], and maps
//! the [`DeliveryOutcome`] onto a [`BatchStatus`].

use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use spool_common::InstrumentationKey;

use crate::loader::BatchStatus;

/// Status codes worth retrying: auth hiccups, throttling, timeouts and
/// transient server errors. 439 is the ingestion endpoint's daily-quota code.
const RETRYABLE_STATUS_CODES: [u16; 9] = [401, 403, 408, 429, 439, 500, 502, 503, 504];

/// Classify an HTTP status code. Status 0 stands for a client-side failure.
pub fn classify_status(status_code: u16) -> BatchStatus {
    match status_code {
        200..=299 => BatchStatus::Success,
        0 => BatchStatus::RetryableFailure,
        code if RETRYABLE_STATUS_CODES.contains(&code) => BatchStatus::RetryableFailure,
        _ => BatchStatus::NonRetryableFailure,
    }
}

/// How a send attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// The endpoint answered with this status code.
    Response { status_code: u16 },
    /// The request never got a response.
    Exception { message: String },
}

impl DeliveryOutcome {
    pub fn status(status_code: u16) -> Self {
        DeliveryOutcome::Response { status_code }
    }

    pub fn exception(message: impl Into<String>) -> Self {
        DeliveryOutcome::Exception {
            message: message.into(),
        }
    }

    pub fn batch_status(&self) -> BatchStatus {
        match self {
            DeliveryOutcome::Response { status_code } => classify_status(*status_code),
            DeliveryOutcome::Exception { .. } => BatchStatus::RetryableFailure,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.batch_status() == BatchStatus::RetryableFailure
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryOutcome::Response { status_code } => write!(f, "status {}", status_code),
            DeliveryOutcome::Exception { message } => write!(f, "exception: {}", message),
        }
    }
}

/// Completes a [`DeliveryHandle`] from the pipeline side.
#[derive(Debug)]
pub struct DeliveryCompleter {
    tx: SyncSender<DeliveryOutcome>,
}

impl DeliveryCompleter {
    pub fn complete(self, outcome: DeliveryOutcome) {
        // The waiter may have timed out and gone away.
        let _ = self.tx.send(outcome);
    }
}

/// Pending result of one send.
#[derive(Debug)]
pub struct DeliveryHandle {
    rx: Receiver<DeliveryOutcome>,
}

impl DeliveryHandle {
    /// A handle plus the completer the pipeline resolves it with.
    pub fn pending() -> (DeliveryCompleter, DeliveryHandle) {
        let (tx, rx) = mpsc::sync_channel(1);
        (DeliveryCompleter { tx }, DeliveryHandle { rx })
    }

    /// An already-resolved handle.
    pub fn ready(outcome: DeliveryOutcome) -> Self {
        let (completer, handle) = Self::pending();
        completer.complete(outcome);
        handle
    }

    /// Wait up to `timeout`. `None` means the wait timed out.
    ///
    /// A completer dropped without completing counts as an exception.
    pub fn wait(self, timeout: Duration) -> Option<DeliveryOutcome> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(DeliveryOutcome::exception(
                "delivery abandoned without a result",
            )),
        }
    }
}

/// The outbound HTTP pipeline.
pub trait DeliveryPipeline: Send + Sync {
    fn send(&self, payload: Vec<u8>, key: &InstrumentationKey) -> DeliveryHandle;
}

/// Notified when a live (not yet spooled) send completes.
pub trait DeliveryListener: Send + Sync {
    fn on_complete(&self, payload: &[u8], key: &InstrumentationKey, outcome: &DeliveryOutcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_classify_status() {
        for code in [200, 204, 206, 299] {
            assert_eq!(classify_status(code), BatchStatus::Success, "{}", code);
        }
        for code in [0, 401, 403, 408, 429, 439, 500, 502, 503, 504] {
            assert_eq!(classify_status(code), BatchStatus::RetryableFailure, "{}", code);
        }
        for code in [300, 400, 404, 413, 501] {
            assert_eq!(
                classify_status(code),
                BatchStatus::NonRetryableFailure,
                "{}",
                code
            );
        }
    }

    #[test]
    fn test_exception_is_retryable() {
        assert!(DeliveryOutcome::exception("connection reset").is_retryable());
        assert!(!DeliveryOutcome::status(400).is_retryable());
    }

    #[test]
    fn test_handle_ready() {
        let outcome = DeliveryHandle::ready(DeliveryOutcome::status(200)).wait(Duration::ZERO);
        assert_eq!(outcome, Some(DeliveryOutcome::status(200)));
    }

    #[test]
    fn test_handle_completed_from_other_thread() {
        let (completer, handle) = DeliveryHandle::pending();
        thread::spawn(move || completer.complete(DeliveryOutcome::status(503)));
        assert_eq!(
            handle.wait(Duration::from_secs(5)),
            Some(DeliveryOutcome::status(503))
        );
    }

    #[test]
    fn test_handle_timeout_and_abandon() {
        let (_completer, handle) = DeliveryHandle::pending();
        assert_eq!(handle.wait(Duration::from_millis(10)), None);

        let (completer, handle) = DeliveryHandle::pending();
        drop(completer);
        assert!(matches!(
            handle.wait(Duration::from_secs(1)),
            Some(DeliveryOutcome::Exception { .. })
        ));
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(DeliveryOutcome::status(429)).unwrap();
        assert_eq!(json["result"], "response");
        assert_eq!(json["status_code"], 429);
    }
}
