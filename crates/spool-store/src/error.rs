//! Storage failures and their classification.
//!
//! Nothing in this crate hands a `StorageError` to a telemetry producer.
//! Private helpers propagate it with `?`; the best-effort entry points
//! (`persist`, `load_next`, `update_status`, `sweep`) catch it, classify it
//! with [`StorageError::kind`], log it and bump the matching counter.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias for internal storage helpers.
pub type StorageResult<T> = Result<T, StorageError>;

/// The four ways a storage operation can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Batch could not be written; it is dropped.
    Write,
    /// Batch could not be read or was corrupt; the file is discarded.
    Read,
    /// File vanished between two steps; treated as an empty result.
    Race,
    /// File could not be deleted; left for the next sweep.
    Delete,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Write => write!(f, "write"),
            FailureKind::Read => write!(f, "read"),
            FailureKind::Race => write!(f, "race"),
            FailureKind::Delete => write!(f, "delete"),
        }
    }
}

/// Errors from storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("spool quota exceeded: {used} of {quota} bytes in use")]
    QuotaExceeded { used: u64, quota: u64 },

    #[error("{kind} failed at {}: {source}", path.display())]
    Io {
        kind: FailureKind,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("batch file vanished: {}", path.display())]
    Vanished { path: PathBuf },

    #[error("corrupt batch file {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("delete of {} failed after {attempts} attempts: {source}", path.display())]
    DeleteExhausted {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    /// Wrap an I/O error; `NotFound` becomes [`StorageError::Vanished`].
    pub fn io(kind: FailureKind, path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            StorageError::Vanished {
                path: path.to_path_buf(),
            }
        } else {
            StorageError::at(kind, path, source)
        }
    }

    /// Wrap an I/O error without reclassifying `NotFound`.
    pub fn at(kind: FailureKind, path: &Path, source: io::Error) -> Self {
        StorageError::Io {
            kind,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        StorageError::Corrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Classify for counting and logging.
    pub fn kind(&self) -> FailureKind {
        match self {
            StorageError::QuotaExceeded { .. } => FailureKind::Write,
            StorageError::Io { kind, .. } => *kind,
            StorageError::Vanished { .. } => FailureKind::Race,
            StorageError::Corrupt { .. } => FailureKind::Read,
            StorageError::DeleteExhausted { .. } => FailureKind::Delete,
        }
    }

    /// Path the failure refers to, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            StorageError::QuotaExceeded { .. } => None,
            StorageError::Io { path, .. }
            | StorageError::Vanished { path }
            | StorageError::Corrupt { path, .. }
            | StorageError::DeleteExhausted { path, .. } => Some(path),
        }
    }
}
