//! Durable disk-backed retry queue for telemetry batches.
//!
//! When a live send fails with a retryable outcome the batch is spilled to
//! disk, resent later by a background task, and deleted once delivered,
//! rejected, or older than the expiry threshold.
//!
//! This crate provides:
//! - [`FileIndex`]: in-memory FIFO of durable batch files
//! - [`Writer`]: quota-bounded atomic spill to disk
//! - [`Loader`]: claim-by-rename and settle after resend
//! - [`Purger`]: expiry sweeps straight off the directory listing
//! - [`RetrySender`]: one claim/send/settle cycle per tick
//! - [`LocalStorage`]: owner that wires these together with two
//!   [`PeriodicTask`] threads
//!
//! No storage failure reaches the telemetry producer. Failures are logged
//! through `tracing`, rate-limited per operation, and counted through
//! [`StorageStats`].

pub mod clock;
pub mod error;
pub mod file_index;
pub mod fs_util;
pub mod listener;
pub mod loader;
pub mod oplog;
pub mod pipeline;
pub mod purger;
pub mod scheduler;
pub mod sender;
pub mod stats;
pub mod status;
pub mod system;
pub mod writer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{FailureKind, StorageError, StorageResult};
pub use file_index::FileIndex;
pub use listener::SpillListener;
pub use loader::{BatchStatus, Loader, PersistedBatch, StatusUpdate};
pub use oplog::OperationLogger;
pub use pipeline::{
    classify_status, DeliveryCompleter, DeliveryHandle, DeliveryListener, DeliveryOutcome,
    DeliveryPipeline,
};
pub use purger::{PurgeCandidate, PurgeReport, Purger};
pub use scheduler::PeriodicTask;
pub use sender::{RetrySender, SendCycle};
pub use stats::{CountingStats, NoopStats, StorageStats};
pub use status::{inspect_batch, BatchInfo, SpoolStatus, StateUsage};
pub use system::{recover_dir, LocalStorage, RecoveryReport};
pub use writer::{PersistOutcome, Writer};
