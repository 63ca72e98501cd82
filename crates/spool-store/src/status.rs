//! Read-only reports over a spool directory.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spool_common::{
    BatchName, Error, FileState, InstrumentationKey, Result, SpoolConfig, INSTRUMENTATION_KEY_LEN,
};

use crate::clock::{duration_millis, Clock};
use crate::fs_util;

/// File count and size for one state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUsage {
    pub files: usize,
    pub bytes: u64,
}

/// Snapshot of a spool directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpoolStatus {
    pub dir: String,
    pub generated_at: Option<DateTime<Utc>>,

    /// Usage keyed by state name (`persisted`, `claimed`, `writing`).
    pub by_state: BTreeMap<String, StateUsage>,

    pub quota_bytes: u64,
    /// Durable bytes as a percentage of the quota.
    pub quota_used_pct: f64,

    pub oldest_persisted_at: Option<DateTime<Utc>>,
    pub oldest_persisted_age_secs: Option<u64>,

    pub expiry_secs: u64,
    /// Durable files a sweep would delete now.
    pub expired_files: usize,
    pub expired_bytes: u64,
}

impl SpoolStatus {
    /// Scan `config.dir` and summarise it.
    pub fn collect(config: &SpoolConfig, clock: &dyn Clock) -> io::Result<Self> {
        let entries = fs_util::scan_dir(&config.dir)?;
        let now = clock.now_millis();
        let expiry_millis = duration_millis(config.expiry());

        let mut by_state: BTreeMap<String, StateUsage> = FileState::ALL
            .iter()
            .map(|s| (s.to_string(), StateUsage::default()))
            .collect();
        for entry in &entries {
            let usage = by_state.entry(entry.state.to_string()).or_default();
            usage.files += 1;
            usage.bytes += entry.size_bytes;
        }

        let persisted: Vec<_> = entries
            .iter()
            .filter(|e| e.state == FileState::Persisted)
            .collect();
        let persisted_bytes: u64 = persisted.iter().map(|e| e.size_bytes).sum();
        let oldest = persisted.first().map(|e| &e.name);
        let expired: Vec<_> = persisted
            .iter()
            .filter(|e| now.saturating_sub(e.name.created_millis()) > expiry_millis)
            .collect();

        Ok(SpoolStatus {
            dir: config.dir.display().to_string(),
            generated_at: DateTime::from_timestamp_millis(now),
            by_state,
            quota_bytes: config.max_size_bytes,
            quota_used_pct: if config.max_size_bytes > 0 {
                (persisted_bytes as f64 / config.max_size_bytes as f64) * 100.0
            } else {
                0.0
            },
            oldest_persisted_at: oldest.and_then(|n| n.created_at()),
            oldest_persisted_age_secs: oldest
                .map(|n| (now.saturating_sub(n.created_millis()).max(0) / 1000) as u64),
            expiry_secs: config.expiry_secs,
            expired_files: expired.len(),
            expired_bytes: expired.iter().map(|e| e.size_bytes).sum(),
        })
    }

    pub fn usage(&self, state: FileState) -> StateUsage {
        self.by_state
            .get(&state.to_string())
            .copied()
            .unwrap_or_default()
    }
}

/// Header-level view of one batch file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchInfo {
    pub path: PathBuf,
    pub name: String,
    pub state: FileState,
    pub created_at: Option<DateTime<Utc>>,
    pub instrumentation_key: InstrumentationKey,
    pub payload_bytes: u64,
}

/// Read and validate the header of a batch file without claiming it.
pub fn inspect_batch(path: &Path) -> Result<BatchInfo> {
    let (name, state) = BatchName::from_path(path).ok_or_else(|| Error::NotABatchFile {
        path: path.to_path_buf(),
    })?;
    let bytes = fs::read(path).map_err(|e| Error::io_at(path, e))?;
    if bytes.len() <= INSTRUMENTATION_KEY_LEN {
        return Err(Error::CorruptBatch {
            path: path.to_path_buf(),
            reason: format!("{} bytes, no payload after key header", bytes.len()),
        });
    }
    let key = InstrumentationKey::from_header(&bytes).ok_or_else(|| Error::CorruptBatch {
        path: path.to_path_buf(),
        reason: "invalid instrumentation key header".to_string(),
    })?;

    Ok(BatchInfo {
        path: path.to_path_buf(),
        name: name.to_string(),
        state,
        created_at: name.created_at(),
        instrumentation_key: key,
        payload_bytes: (bytes.len() - INSTRUMENTATION_KEY_LEN) as u64,
    })
}
