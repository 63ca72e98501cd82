//! Expiry sweeps over the spool directory.
//!
//! The purger works straight off the directory listing, not the file index,
//! so batches are removed even when the index lost track of them. Only
//! `.trn` files are candidates: a claimed `.tmp` is owned by an in-flight
//! resend and a `.part` is still being written.
//!
//! Age comes from the creation time embedded in the file name, not mtime,
//! so a batch that bounced through several retries keeps its original age.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spool_common::{FileState, SpoolConfig};
use tracing::{debug, info};

use crate::clock::{duration_millis, Clock};
use crate::error::{FailureKind, StorageError, StorageResult};
use crate::file_index::FileIndex;
use crate::fs_util::{self, BatchEntry};
use crate::oplog::OperationLogger;

/// An expired batch that a sweep would delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeCandidate {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub age_secs: u64,
    pub created_at: Option<DateTime<Utc>>,
}

/// Summary of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeReport {
    /// Durable files examined.
    pub scanned: usize,
    /// Expired files deleted.
    pub removed: usize,
    /// Expired files that could not be deleted.
    pub failed: usize,
    /// Bytes released by the deletions.
    pub bytes_freed: u64,
}

/// Deletes durable batches older than the expiry threshold.
pub struct Purger {
    dir: PathBuf,
    expiry: Duration,
    clock: Arc<dyn Clock>,
    index: Option<Arc<FileIndex>>,
    delete_attempts: u32,
    delete_backoff: Duration,
    log: OperationLogger,
}

impl Purger {
    pub fn new(config: &SpoolConfig, clock: Arc<dyn Clock>) -> Self {
        Purger {
            dir: config.dir.clone(),
            expiry: config.expiry(),
            clock,
            index: None,
            delete_attempts: config.delete_retry_attempts,
            delete_backoff: config.delete_retry_backoff(),
            log: OperationLogger::new("purge", config.warning_interval(), config.suppress_warnings),
        }
    }

    /// Also drop deleted paths from `index`.
    pub fn with_index(mut self, index: Arc<FileIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    fn scan(&self) -> StorageResult<(usize, Vec<(BatchEntry, u64)>)> {
        let entries = fs_util::list_state(&self.dir, FileState::Persisted)
            .map_err(|e| StorageError::at(FailureKind::Read, &self.dir, e))?;
        let scanned = entries.len();
        let now = self.clock.now_millis();
        let expiry_millis = duration_millis(self.expiry);

        let expired = entries
            .into_iter()
            .filter_map(|entry| {
                let age_millis = now.saturating_sub(entry.name.created_millis());
                (age_millis > expiry_millis).then(|| (entry, (age_millis / 1000) as u64))
            })
            .collect();
        Ok((scanned, expired))
    }

    /// List expired batches without deleting anything.
    pub fn preview(&self) -> StorageResult<Vec<PurgeCandidate>> {
        let (_, expired) = self.scan()?;
        Ok(expired
            .into_iter()
            .map(|(entry, age_secs)| PurgeCandidate {
                created_at: entry.name.created_at(),
                path: entry.path,
                size_bytes: entry.size_bytes,
                age_secs,
            })
            .collect())
    }

    /// Delete every expired batch. Never fails; problems are logged and
    /// reflected in the report.
    pub fn sweep(&self) -> PurgeReport {
        let (scanned, expired) = match self.scan() {
            Ok(found) => found,
            Err(err) => {
                self.log.record_failure("could not scan spool directory", &err);
                return PurgeReport::default();
            }
        };

        let mut report = PurgeReport {
            scanned,
            ..Default::default()
        };
        for (entry, age_secs) in expired {
            match fs_util::delete_with_retries(&entry.path, self.delete_attempts, self.delete_backoff)
            {
                Ok(existed) => {
                    if let Some(index) = &self.index {
                        index.remove(&entry.path);
                    }
                    if existed {
                        report.removed += 1;
                        report.bytes_freed += entry.size_bytes;
                        debug!(
                            op = "purge",
                            path = %entry.path.display(),
                            age_secs,
                            "expired batch deleted"
                        );
                    }
                }
                Err(err) => {
                    report.failed += 1;
                    self.log
                        .record_failure("could not delete expired batch", &err);
                }
            }
        }

        if report.failed == 0 {
            self.log.record_success();
        }
        if report.removed > 0 {
            info!(
                op = "purge",
                dir = %self.dir.display(),
                removed = report.removed,
                bytes_freed = report.bytes_freed,
                expiry_secs = self.expiry.as_secs(),
                "purged expired telemetry batches"
            );
        } else {
            debug!(op = "purge", dir = %self.dir.display(), scanned, "nothing to purge");
        }
        report
    }
}
