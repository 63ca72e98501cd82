//! Periodic resend of spooled batches.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::loader::{BatchStatus, Loader, StatusUpdate};
use crate::pipeline::DeliveryPipeline;

/// What one resend cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendCycle {
    /// Nothing to send.
    Idle,
    /// Sent and deleted.
    Delivered,
    /// Retryable failure; back in the queue.
    Requeued,
    /// Rejected for good; deleted.
    Dropped,
    /// No answer within the send timeout; back in the queue.
    TimedOut,
}

impl fmt::Display for SendCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SendCycle::Idle => "idle",
            SendCycle::Delivered => "delivered",
            SendCycle::Requeued => "requeued",
            SendCycle::Dropped => "dropped",
            SendCycle::TimedOut => "timed_out",
        };
        write!(f, "{}", s)
    }
}

/// Drives the loader against the delivery pipeline, one batch per cycle.
pub struct RetrySender {
    loader: Arc<Loader>,
    pipeline: Arc<dyn DeliveryPipeline>,
    timeout: Duration,
}

impl RetrySender {
    pub fn new(loader: Arc<Loader>, pipeline: Arc<dyn DeliveryPipeline>, timeout: Duration) -> Self {
        RetrySender {
            loader,
            pipeline,
            timeout,
        }
    }

    /// Claim the oldest batch, send it, and settle it.
    pub fn run_once(&self) -> SendCycle {
        let Some(batch) = self.loader.load_next() else {
            return SendCycle::Idle;
        };
        let (claimed, key, payload) = batch.into_parts();
        let bytes = payload.len();

        let handle = self.pipeline.send(payload, &key);
        let (status, cycle) = match handle.wait(self.timeout) {
            Some(outcome) => {
                let status = outcome.batch_status();
                debug!(
                    op = "resend",
                    path = %claimed.display(),
                    outcome = %outcome,
                    bytes,
                    "resend completed"
                );
                let cycle = match status {
                    BatchStatus::Success => SendCycle::Delivered,
                    BatchStatus::RetryableFailure => SendCycle::Requeued,
                    BatchStatus::NonRetryableFailure => SendCycle::Dropped,
                };
                (status, cycle)
            }
            None => {
                info!(
                    op = "resend",
                    path = %claimed.display(),
                    timeout_secs = self.timeout.as_secs(),
                    "resend timed out, will retry"
                );
                (BatchStatus::RetryableFailure, SendCycle::TimedOut)
            }
        };

        if let StatusUpdate::Failed = self.loader.update_status(&claimed, status) {
            debug!(op = "resend", path = %claimed.display(), "batch left on disk after settle failure");
        }
        cycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_index::FileIndex;
    use crate::pipeline::{DeliveryHandle, DeliveryOutcome};
    use crate::stats::NoopStats;
    use spool_common::{InstrumentationKey, SpoolConfig};
    use std::fs;
    use std::sync::Mutex;
    use tempfile::tempdir;

    const KEY: &str = "00000000-0000-0000-0000-000000000000";

    /// Answers every send with the next scripted outcome; `None` never answers.
    struct Scripted {
        outcomes: Mutex<Vec<Option<DeliveryOutcome>>>,
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl DeliveryPipeline for Scripted {
        fn send(&self, payload: Vec<u8>, _key: &InstrumentationKey) -> DeliveryHandle {
            self.sent.lock().unwrap().push(payload);
            match self.outcomes.lock().unwrap().remove(0) {
                Some(outcome) => DeliveryHandle::ready(outcome),
                None => {
                    let (completer, handle) = DeliveryHandle::pending();
                    std::mem::forget(completer);
                    handle
                }
            }
        }
    }

    fn sender(
        dir: &std::path::Path,
        outcomes: Vec<Option<DeliveryOutcome>>,
    ) -> (RetrySender, Arc<FileIndex>, Arc<Scripted>) {
        let index = Arc::new(FileIndex::new());
        let mut config = SpoolConfig::for_dir(dir);
        config.delete_retry_backoff_ms = 0;
        let loader = Arc::new(Loader::new(&config, Arc::clone(&index), Arc::new(NoopStats)));
        let pipeline = Arc::new(Scripted {
            outcomes: Mutex::new(outcomes),
            sent: Mutex::new(Vec::new()),
        });
        let sender = RetrySender::new(loader, pipeline.clone(), Duration::from_millis(20));
        (sender, index, pipeline)
    }

    fn spill(dir: &std::path::Path, index: &FileIndex, stem: &str) {
        let path = dir.join(format!("{}.trn", stem));
        let mut bytes = KEY.as_bytes().to_vec();
        bytes.extend_from_slice(stem.as_bytes());
        fs::write(&path, bytes).unwrap();
        index.enqueue(path);
    }

    #[test]
    fn test_idle_when_empty() {
        let dir = tempdir().unwrap();
        let (sender, _, pipeline) = sender(dir.path(), vec![]);
        assert_eq!(sender.run_once(), SendCycle::Idle);
        assert!(pipeline.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_outcomes_map_to_cycles() {
        let dir = tempdir().unwrap();
        let (sender, index, pipeline) = sender(
            dir.path(),
            vec![
                Some(DeliveryOutcome::status(200)),
                Some(DeliveryOutcome::status(400)),
                Some(DeliveryOutcome::status(503)),
                None,
            ],
        );
        for stem in ["1-a", "2-b", "3-c", "4-d"] {
            spill(dir.path(), &index, stem);
        }

        assert_eq!(sender.run_once(), SendCycle::Delivered);
        assert_eq!(sender.run_once(), SendCycle::Dropped);
        assert_eq!(sender.run_once(), SendCycle::Requeued);
        assert_eq!(sender.run_once(), SendCycle::TimedOut);

        assert_eq!(pipeline.sent.lock().unwrap()[0], b"1-a");
        let mut left: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        left.sort();
        assert_eq!(left, vec!["3-c.trn", "4-d.trn"]);
        assert_eq!(index.len(), 2);
    }
}
