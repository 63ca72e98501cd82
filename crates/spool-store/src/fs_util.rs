//! Directory scans and the small file primitives every component shares.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use spool_common::{BatchName, FileState};
use tracing::debug;

use crate::error::{FailureKind, StorageError, StorageResult};

/// A batch file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub name: BatchName,
    pub state: FileState,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// List every batch file directly inside `dir`, oldest first.
///
/// Files whose names do not parse, subdirectories, and files that vanish
/// mid-scan are skipped.
pub fn scan_dir(dir: &Path) -> io::Result<Vec<BatchEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        let Some((name, state)) = BatchName::from_path(&path) else {
            continue;
        };
        let Ok(meta) = entry.metadata() else { continue };
        if !meta.is_file() {
            continue;
        }
        entries.push(BatchEntry {
            name,
            state,
            path,
            size_bytes: meta.len(),
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// List batch files in one state, oldest first.
pub fn list_state(dir: &Path, state: FileState) -> io::Result<Vec<BatchEntry>> {
    let mut entries = scan_dir(dir)?;
    entries.retain(|e| e.state == state);
    Ok(entries)
}

/// Total bytes of files in `state`.
pub fn total_bytes(dir: &Path, state: FileState) -> io::Result<u64> {
    Ok(list_state(dir, state)?.iter().map(|e| e.size_bytes).sum())
}

/// Write `chunks` to `part`, fsync, then rename onto `dest`.
///
/// The part file is removed if any step fails.
pub fn write_atomic(part: &Path, dest: &Path, chunks: &[&[u8]]) -> io::Result<()> {
    let result = (|| {
        let mut file = OpenOptions::new().write(true).create_new(true).open(part)?;
        for chunk in chunks {
            file.write_all(chunk)?;
        }
        file.sync_all()?;
        fs::rename(part, dest)
    })();

    if result.is_err() {
        let _ = fs::remove_file(part);
    }
    result
}

/// Rename `from` to `to`, classifying failures.
pub fn rename(from: &Path, to: &Path, kind: FailureKind) -> StorageResult<()> {
    fs::rename(from, to).map_err(|e| StorageError::io(kind, from, e))
}

/// Delete `path`, retrying up to `attempts` times with `backoff` between tries.
///
/// Returns `Ok(false)` if the file was already gone.
pub fn delete_with_retries(path: &Path, attempts: u32, backoff: Duration) -> StorageResult<bool> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match fs::remove_file(path) {
            Ok(()) => return Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) if attempt >= attempts => {
                return Err(StorageError::DeleteExhausted {
                    path: path.to_path_buf(),
                    attempts,
                    source: e,
                });
            }
            Err(e) => {
                debug!(
                    path = %path.display(),
                    attempt,
                    error = %e,
                    "delete failed, retrying"
                );
                thread::sleep(backoff);
                attempt += 1;
            }
        }
    }
}
