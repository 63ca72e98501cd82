//! In-memory FIFO of durable batch files.
//!
//! Entries are paths to `.trn` files, never payloads. A path appears at most
//! once. The lock guards only the queue; no disk I/O happens under it.
//! Entries may go stale when the purger or an operator removes a file; the
//! loader resolves that when it dequeues.

use std::collections::{HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use spool_common::FileState;
use tracing::debug;

use crate::fs_util;

#[derive(Debug, Default)]
struct IndexState {
    queue: VecDeque<PathBuf>,
    members: HashSet<PathBuf>,
}

/// Thread-safe FIFO of paths to durable batch files.
#[derive(Debug, Default)]
pub struct FileIndex {
    state: Mutex<IndexState>,
}

impl FileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, IndexState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `path` at the tail. Returns false if it was already queued.
    pub fn enqueue(&self, path: PathBuf) -> bool {
        let mut state = self.state();
        if !state.members.insert(path.clone()) {
            return false;
        }
        state.queue.push_back(path);
        true
    }

    /// Insert `path` at the head. Returns false if it was already queued.
    pub fn enqueue_front(&self, path: PathBuf) -> bool {
        let mut state = self.state();
        if !state.members.insert(path.clone()) {
            return false;
        }
        state.queue.push_front(path);
        true
    }

    /// Remove and return the oldest path.
    pub fn dequeue_head(&self) -> Option<PathBuf> {
        let mut state = self.state();
        let path = state.queue.pop_front()?;
        state.members.remove(&path);
        Some(path)
    }

    /// Drop `path` wherever it sits. Returns true if it was queued.
    pub fn remove(&self, path: &Path) -> bool {
        let mut state = self.state();
        if !state.members.remove(path) {
            return false;
        }
        state.queue.retain(|p| p != path);
        true
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.state().members.contains(path)
    }

    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().queue.is_empty()
    }

    /// Ordered copy of the queue, head first.
    pub fn snapshot(&self) -> Vec<PathBuf> {
        self.state().queue.iter().cloned().collect()
    }

    /// Enqueue every `.trn` file in `dir`, oldest creation time first.
    ///
    /// Returns the number of paths added.
    pub fn seed_from_disk(&self, dir: &Path) -> io::Result<usize> {
        let entries = fs_util::list_state(dir, FileState::Persisted)?;
        let added = entries
            .into_iter()
            .filter(|entry| self.enqueue(entry.path.clone()))
            .count();
        debug!(dir = %dir.display(), added, "seeded file index");
        Ok(added)
    }
}
