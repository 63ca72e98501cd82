//! Spills failed batches to disk.
//!
//! Every batch becomes one file: the 36-byte instrumentation key header
//! followed by the opaque payload. The bytes land in a private `.part` file
//! which is fsynced and renamed onto its `.trn` name, so the loader and the
//! purger only ever see complete files.

use std::path::PathBuf;
use std::sync::Arc;

use spool_common::{BatchName, FileState, InstrumentationKey, SpoolConfig};
use tracing::debug;

use crate::clock::Clock;
use crate::error::{FailureKind, StorageError, StorageResult};
use crate::file_index::FileIndex;
use crate::fs_util;
use crate::oplog::OperationLogger;
use crate::stats::StorageStats;

/// What happened to a batch handed to [`Writer::persist`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Durable at this path and queued for resend.
    Persisted(PathBuf),
    /// Dropped: the spool already holds `used` bytes of a `quota` budget.
    QuotaExceeded { used: u64, quota: u64 },
    /// Dropped after an I/O failure.
    Failed,
}

impl PersistOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self, PersistOutcome::Persisted(_))
    }
}

/// Quota-bounded batch writer.
pub struct Writer {
    dir: PathBuf,
    quota_bytes: u64,
    index: Arc<FileIndex>,
    clock: Arc<dyn Clock>,
    stats: Arc<dyn StorageStats>,
    log: OperationLogger,
}

impl Writer {
    pub fn new(
        config: &SpoolConfig,
        index: Arc<FileIndex>,
        clock: Arc<dyn Clock>,
        stats: Arc<dyn StorageStats>,
    ) -> Self {
        Writer {
            dir: config.dir.clone(),
            quota_bytes: config.max_size_bytes,
            index,
            clock,
            stats,
            log: OperationLogger::new(
                "persist",
                config.warning_interval(),
                config.suppress_warnings,
            ),
        }
    }

    /// Persist one batch. Never fails toward the caller: failures are logged,
    /// counted and reported through the returned outcome.
    pub fn persist(&self, key: &InstrumentationKey, payload: &[u8]) -> PersistOutcome {
        match self.write_batch(key, payload) {
            Ok(path) => {
                self.log.record_success();
                debug!(
                    op = "persist",
                    path = %path.display(),
                    bytes = payload.len(),
                    "batch persisted"
                );
                self.index.enqueue(path.clone());
                PersistOutcome::Persisted(path)
            }
            Err(err) => {
                self.stats.increment_write_failure_count();
                self.log
                    .record_failure("could not persist telemetry batch, dropping it", &err);
                match err {
                    StorageError::QuotaExceeded { used, quota } => {
                        PersistOutcome::QuotaExceeded { used, quota }
                    }
                    _ => PersistOutcome::Failed,
                }
            }
        }
    }

    fn write_batch(&self, key: &InstrumentationKey, payload: &[u8]) -> StorageResult<PathBuf> {
        // Soft bound: concurrent writers may each pass this check.
        let used = fs_util::total_bytes(&self.dir, FileState::Persisted)
            .map_err(|e| StorageError::at(FailureKind::Write, &self.dir, e))?;
        if used >= self.quota_bytes {
            return Err(StorageError::QuotaExceeded {
                used,
                quota: self.quota_bytes,
            });
        }

        let name = BatchName::generate(self.clock.now_millis());
        let part = name.path_in(&self.dir, FileState::Writing);
        let dest = name.path_in(&self.dir, FileState::Persisted);
        fs_util::write_atomic(&part, &dest, &[key.as_header(), payload])
            .map_err(|e| StorageError::at(FailureKind::Write, &part, e))?;
        Ok(dest)
    }
}
