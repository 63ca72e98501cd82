//! Error types shared across spool crates.
//!
//! The storage engine itself never surfaces errors to telemetry producers;
//! these types cover the places where a caller does get a `Result`:
//! opening a spool directory, loading configuration, and operator tooling.
//!
//! Errors carry a stable numeric code and a category so the CLI can map them
//! onto exit codes and JSON output.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for spool operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration file or value errors.
    Config,
    /// Batch identity and on-disk format errors.
    Format,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Format => write!(f, "format"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for spool.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("config file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("invalid TOML in config file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    // Format errors (20-29)
    #[error("invalid instrumentation key: {0:?}")]
    InvalidInstrumentationKey(String),

    #[error("not a batch file: {}", path.display())]
    NotABatchFile { path: PathBuf },

    #[error("corrupt batch file {}: {reason}", path.display())]
    CorruptBatch { path: PathBuf, reason: String },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error at {}: {source}", path.display())]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the stable error code for this error.
    ///
    /// - 10-19: Configuration errors
    /// - 20-29: Format errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::ConfigNotFound { .. } => 11,
            Error::ConfigParse { .. } => 12,
            Error::InvalidInstrumentationKey(_) => 20,
            Error::NotABatchFile { .. } => 21,
            Error::CorruptBatch { .. } => 22,
            Error::Io(_) => 60,
            Error::IoAt { .. } => 61,
            Error::Json(_) => 62,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::ConfigNotFound { .. } | Error::ConfigParse { .. } => {
                ErrorCategory::Config
            }
            Error::InvalidInstrumentationKey(_)
            | Error::NotABatchFile { .. }
            | Error::CorruptBatch { .. } => ErrorCategory::Format,
            Error::Io(_) | Error::IoAt { .. } | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Attach a path to an I/O error.
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::IoAt {
            path: path.into(),
            source,
        }
    }
}
