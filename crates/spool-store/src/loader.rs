//! Claims spilled batches for resend and settles them afterwards.
//!
//! Claiming is a rename from `.trn` to `.tmp`. The rename is the mutual
//! exclusion: whoever renames first owns the batch, and the purger never
//! looks at `.tmp` files. Settling either deletes the claimed file or renames
//! it back to `.trn` and re-queues it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use spool_common::{
    BatchName, FileState, InstrumentationKey, RequeuePolicy, SpoolConfig, INSTRUMENTATION_KEY_LEN,
};
use tracing::debug;

use crate::error::{FailureKind, StorageError, StorageResult};
use crate::file_index::FileIndex;
use crate::fs_util;
use crate::oplog::OperationLogger;
use crate::stats::StorageStats;

/// Result of a resend attempt, as far as the spool cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Success,
    RetryableFailure,
    NonRetryableFailure,
}

/// What [`Loader::update_status`] did with a claimed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// Claimed file deleted.
    Deleted,
    /// Renamed back to this `.trn` path and re-queued.
    Requeued(PathBuf),
    /// The claimed file no longer existed; nothing to do.
    Missing,
    /// Delete or rename failed; the file stays for the next sweep or restart.
    Failed,
}

/// A claimed batch, ready to resend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedBatch {
    name: BatchName,
    claimed_path: PathBuf,
    key: InstrumentationKey,
    payload: Vec<u8>,
}

impl PersistedBatch {
    pub fn name(&self) -> &BatchName {
        &self.name
    }

    /// Path of the `.tmp` file backing this claim.
    pub fn claimed_path(&self) -> &Path {
        &self.claimed_path
    }

    pub fn key(&self) -> &InstrumentationKey {
        &self.key
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_parts(self) -> (PathBuf, InstrumentationKey, Vec<u8>) {
        (self.claimed_path, self.key, self.payload)
    }
}

/// Claims and settles batches in index order.
pub struct Loader {
    index: Arc<FileIndex>,
    stats: Arc<dyn StorageStats>,
    requeue_policy: RequeuePolicy,
    delete_attempts: u32,
    delete_backoff: Duration,
    load_log: OperationLogger,
    settle_log: OperationLogger,
}

impl Loader {
    pub fn new(config: &SpoolConfig, index: Arc<FileIndex>, stats: Arc<dyn StorageStats>) -> Self {
        Loader {
            index,
            stats,
            requeue_policy: config.requeue_policy,
            delete_attempts: config.delete_retry_attempts,
            delete_backoff: config.delete_retry_backoff(),
            load_log: OperationLogger::new(
                "load",
                config.warning_interval(),
                config.suppress_warnings,
            ),
            settle_log: OperationLogger::new(
                "update_status",
                config.warning_interval(),
                config.suppress_warnings,
            ),
        }
    }

    /// Claim and read the oldest queued batch.
    ///
    /// Returns `None` when the index is empty, when the head entry went stale,
    /// or when the batch could not be claimed or read. Only corrupt content is
    /// discarded; a batch that hit an I/O error stays on disk.
    pub fn load_next(&self) -> Option<PersistedBatch> {
        let path = self.index.dequeue_head()?;
        let (name, claimed) = match self.claim(&path) {
            Ok(claim) => claim,
            Err(err) => {
                self.claim_failed(&path, err);
                return None;
            }
        };

        match read_claimed(name, &claimed) {
            Ok(batch) => {
                self.load_log.record_success();
                debug!(
                    op = "load",
                    path = %batch.claimed_path.display(),
                    bytes = batch.payload.len(),
                    "claimed batch"
                );
                Some(batch)
            }
            Err(err) => {
                self.read_failed(&claimed, err);
                None
            }
        }
    }

    fn claim(&self, path: &Path) -> StorageResult<(BatchName, PathBuf)> {
        let (name, _) = BatchName::from_path(path)
            .ok_or_else(|| StorageError::corrupt(path, "not a batch file name"))?;
        let claimed = path.with_extension(FileState::Claimed.extension());
        fs_util::rename(path, &claimed, FailureKind::Read)?;
        Ok((name, claimed))
    }

    /// The `.trn` file was never claimed; leave it where it is.
    fn claim_failed(&self, path: &Path, err: StorageError) {
        if err.kind() == FailureKind::Race {
            debug!(op = "load", path = %path.display(), "queued batch vanished before claim");
            return;
        }
        self.stats.increment_read_failure_count();
        self.load_log
            .record_failure("could not claim telemetry batch, leaving it on disk", &err);
    }

    /// The batch is claimed but unusable: discard it if corrupt, otherwise
    /// return it to the queue.
    fn read_failed(&self, claimed: &Path, err: StorageError) {
        match err {
            StorageError::Vanished { .. } => {
                debug!(op = "load", path = %claimed.display(), "claimed batch vanished before read");
            }
            StorageError::Corrupt { .. } => {
                self.stats.increment_read_failure_count();
                self.load_log
                    .record_failure("discarding corrupt telemetry batch", &err);
                self.discard(claimed);
            }
            _ => {
                self.stats.increment_read_failure_count();
                self.load_log
                    .record_failure("could not read telemetry batch, returning it to the queue", &err);
                self.return_to_queue(claimed, "load", &self.load_log);
            }
        }
    }

    fn discard(&self, claimed: &Path) {
        match fs_util::delete_with_retries(claimed, self.delete_attempts, self.delete_backoff) {
            Ok(_) => debug!(op = "load", path = %claimed.display(), "corrupt batch discarded"),
            Err(err) => {
                self.load_log
                    .record_failure("could not delete corrupt batch", &err);
            }
        }
    }

    /// Settle a claimed batch after a resend attempt.
    ///
    /// Success and non-retryable failure delete the file; retryable failure
    /// returns it to the queue. Calling this twice is a safe no-op.
    pub fn update_status(&self, claimed: &Path, status: BatchStatus) -> StatusUpdate {
        match status {
            BatchStatus::Success | BatchStatus::NonRetryableFailure => self.delete(claimed),
            BatchStatus::RetryableFailure => {
                let update = self.return_to_queue(claimed, "update_status", &self.settle_log);
                if matches!(update, StatusUpdate::Requeued(_)) {
                    self.settle_log.record_success();
                }
                update
            }
        }
    }

    fn return_to_queue(&self, claimed: &Path, op: &'static str, log: &OperationLogger) -> StatusUpdate {
        let durable = claimed.with_extension(FileState::Persisted.extension());
        match fs_util::rename(claimed, &durable, FailureKind::Read) {
            Ok(()) => {
                match self.requeue_policy {
                    RequeuePolicy::Tail => self.index.enqueue(durable.clone()),
                    RequeuePolicy::Head => self.index.enqueue_front(durable.clone()),
                };
                debug!(
                    op,
                    path = %durable.display(),
                    policy = %self.requeue_policy,
                    "batch re-queued for retry"
                );
                StatusUpdate::Requeued(durable)
            }
            Err(err) if err.kind() == FailureKind::Race => {
                debug!(op, path = %claimed.display(), "claimed batch already gone");
                StatusUpdate::Missing
            }
            Err(err) => {
                log.record_failure("could not return batch to the queue", &err);
                StatusUpdate::Failed
            }
        }
    }

    fn delete(&self, path: &Path) -> StatusUpdate {
        match fs_util::delete_with_retries(path, self.delete_attempts, self.delete_backoff) {
            Ok(true) => {
                self.settle_log.record_success();
                debug!(op = "update_status", path = %path.display(), "batch deleted");
                StatusUpdate::Deleted
            }
            Ok(false) => {
                debug!(op = "update_status", path = %path.display(), "batch already deleted");
                StatusUpdate::Missing
            }
            Err(err) => {
                self.settle_log
                    .record_failure("could not delete batch, leaving it for later", &err);
                StatusUpdate::Failed
            }
        }
    }
}

/// Read a claimed file and split it into key and payload.
fn read_claimed(name: BatchName, claimed: &Path) -> StorageResult<PersistedBatch> {
    let mut bytes =
        fs::read(claimed).map_err(|e| StorageError::io(FailureKind::Read, claimed, e))?;
    if bytes.len() <= INSTRUMENTATION_KEY_LEN {
        return Err(StorageError::corrupt(
            claimed,
            format!("{} bytes, no payload after key header", bytes.len()),
        ));
    }
    let key = InstrumentationKey::from_header(&bytes)
        .ok_or_else(|| StorageError::corrupt(claimed, "invalid instrumentation key header"))?;
    let payload = bytes.split_off(INSTRUMENTATION_KEY_LEN);

    Ok(PersistedBatch {
        name,
        claimed_path: claimed.to_path_buf(),
        key,
        payload,
    })
}
