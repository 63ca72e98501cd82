//! Failure counters reported to the agent's self-diagnostics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Sink for storage failure counts.
pub trait StorageStats: Send + Sync {
    fn increment_read_failure_count(&self);
    fn increment_write_failure_count(&self);
}

/// Discards every count.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStats;

impl StorageStats for NoopStats {
    fn increment_read_failure_count(&self) {}
    fn increment_write_failure_count(&self) {}
}

/// In-process counters, readable by status reporting and tests.
#[derive(Debug, Default)]
pub struct CountingStats {
    read_failures: AtomicU64,
    write_failures: AtomicU64,
}

impl CountingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_failures(&self) -> u64 {
        self.read_failures.load(Ordering::Relaxed)
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }
}

impl StorageStats for CountingStats {
    fn increment_read_failure_count(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_write_failure_count(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }
}
