//! Batch identity types.
//!
//! A spilled batch is identified by its file name alone. The name carries the
//! creation time and a unique suffix; the extension carries the state:
//!
//! ```text
//! 1768487422123-9f1c0e2a4b7d4c55a0b1c2d3e4f50617.trn   durable, unclaimed
//! 1768487422123-9f1c0e2a4b7d4c55a0b1c2d3e4f50617.tmp   claimed for resend
//! 1768487422123-9f1c0e2a4b7d4c55a0b1c2d3e4f50617.part  write in progress
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Width of the instrumentation key header at the start of every batch file.
pub const INSTRUMENTATION_KEY_LEN: usize = 36;

static RE_INSTRUMENTATION_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap()
});

/// Instrumentation key identifying the destination telemetry namespace.
///
/// Always exactly 36 ASCII bytes, UUID-shaped. Upper-case hex is accepted
/// and preserved as given; validation is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstrumentationKey(String);

impl InstrumentationKey {
    /// Parse and validate a key string.
    pub fn parse(s: &str) -> Result<Self> {
        if Self::is_valid(s) {
            Ok(InstrumentationKey(s.to_string()))
        } else {
            Err(Error::InvalidInstrumentationKey(s.to_string()))
        }
    }

    /// Returns true if `s` is a well-formed key.
    pub fn is_valid(s: &str) -> bool {
        s.len() == INSTRUMENTATION_KEY_LEN && RE_INSTRUMENTATION_KEY.is_match(&s.to_ascii_lowercase())
    }

    /// Decode a key from the fixed-width file header.
    ///
    /// Returns `None` for short input, non-UTF-8 bytes, or a malformed key.
    pub fn from_header(header: &[u8]) -> Option<Self> {
        let bytes = header.get(..INSTRUMENTATION_KEY_LEN)?;
        let s = std::str::from_utf8(bytes).ok()?;
        if Self::is_valid(s) {
            Some(InstrumentationKey(s.to_string()))
        } else {
            None
        }
    }

    /// The fixed-width header bytes written at offset 0 of a batch file.
    pub fn as_header(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for InstrumentationKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        InstrumentationKey::parse(s)
    }
}

impl TryFrom<String> for InstrumentationKey {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        if InstrumentationKey::is_valid(&s) {
            Ok(InstrumentationKey(s))
        } else {
            Err(Error::InvalidInstrumentationKey(s))
        }
    }
}

impl From<InstrumentationKey> for String {
    fn from(key: InstrumentationKey) -> Self {
        key.0
    }
}

/// State of a batch file, encoded in its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    /// Durable and waiting to be resent (`.trn`).
    Persisted,
    /// Claimed by the loader while a resend is in flight (`.tmp`).
    Claimed,
    /// Being written; never visible to the loader or purger (`.part`).
    Writing,
}

impl FileState {
    pub const ALL: [FileState; 3] = [FileState::Persisted, FileState::Claimed, FileState::Writing];

    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            FileState::Persisted => "trn",
            FileState::Claimed => "tmp",
            FileState::Writing => "part",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "trn" => Some(FileState::Persisted),
            "tmp" => Some(FileState::Claimed),
            "part" => Some(FileState::Writing),
            _ => None,
        }
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileState::Persisted => write!(f, "persisted"),
            FileState::Claimed => write!(f, "claimed"),
            FileState::Writing => write!(f, "writing"),
        }
    }
}

/// Stem of a batch file name: `<epochMillis>-<suffix>`.
///
/// The suffix is a simple-format UUID v4 generated at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchName {
    created_millis: i64,
    suffix: String,
}

impl BatchName {
    /// Generate a fresh name for a batch created at `created_millis`.
    pub fn generate(created_millis: i64) -> Self {
        BatchName {
            created_millis,
            suffix: uuid::Uuid::new_v4().simple().to_string(),
        }
    }

    /// Parse a stem such as `1768487422123-9f1c...`.
    pub fn parse_stem(stem: &str) -> Option<Self> {
        let (millis, suffix) = stem.split_once('-')?;
        if millis.is_empty() || !millis.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return None;
        }
        let created_millis = millis.parse::<i64>().ok()?;
        Some(BatchName {
            created_millis,
            suffix: suffix.to_string(),
        })
    }

    /// Parse a full path or file name into its name and state.
    ///
    /// Returns `None` for anything that is not a batch file.
    pub fn from_path(path: &Path) -> Option<(Self, FileState)> {
        let state = FileState::from_extension(path.extension()?.to_str()?)?;
        let name = BatchName::parse_stem(path.file_stem()?.to_str()?)?;
        Some((name, state))
    }

    /// Creation time in epoch milliseconds.
    pub fn created_millis(&self) -> i64 {
        self.created_millis
    }

    /// Creation time as a UTC timestamp, if representable.
    pub fn created_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp_millis(self.created_millis)
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// File name for this batch in the given state.
    pub fn file_name(&self, state: FileState) -> String {
        format!("{}.{}", self, state.extension())
    }

    /// Path of this batch inside `dir` in the given state.
    pub fn path_in(&self, dir: &Path, state: FileState) -> PathBuf {
        dir.join(self.file_name(state))
    }
}

impl fmt::Display for BatchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.created_millis, self.suffix)
    }
}
