//! Owner of one spool directory and its background tasks.
//!
//! ```no_run
//! use std::sync::Arc;
//! use spool_common::SpoolConfig;
//! use spool_store::{DeliveryHandle, DeliveryOutcome, DeliveryPipeline, LocalStorage};
//!
//! struct Http;
//! impl DeliveryPipeline for Http {
//!     fn send(&self, _payload: Vec<u8>, _key: &spool_common::InstrumentationKey) -> DeliveryHandle {
//!         DeliveryHandle::ready(DeliveryOutcome::status(200))
//!     }
//! }
//!
//! let mut storage = LocalStorage::open(SpoolConfig::default())?;
//! storage.start(Arc::new(Http))?;
//! let listener = storage.spill_listener();
//! // register `listener` with the live pipeline ...
//! storage.shutdown();
//! # Ok::<(), spool_common::Error>(())
//! ```

use std::fs;
use std::io;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use spool_common::{Error, FileState, Result, SpoolConfig};
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::file_index::FileIndex;
use crate::fs_util;
use crate::listener::SpillListener;
use crate::loader::Loader;
use crate::pipeline::DeliveryPipeline;
use crate::purger::Purger;
use crate::scheduler::PeriodicTask;
use crate::sender::RetrySender;
use crate::stats::{NoopStats, StorageStats};
use crate::status::SpoolStatus;
use crate::writer::Writer;

/// What opening a directory had to clean up after a crash.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Half-written `.part` files removed.
    pub partials_removed: usize,
    /// Claimed `.tmp` files renamed back to `.trn`.
    pub orphans_adopted: usize,
}

/// Remove `.part` leftovers and, if `adopt_orphans`, return `.tmp` files to
/// the durable state. Only safe while no other process uses `dir`.
pub fn recover_dir(dir: &std::path::Path, adopt_orphans: bool) -> Result<RecoveryReport> {
    let entries = fs_util::scan_dir(dir).map_err(|e| Error::io_at(dir, e))?;
    let mut report = RecoveryReport::default();

    for entry in entries {
        match entry.state {
            FileState::Writing => match fs::remove_file(&entry.path) {
                Ok(()) => report.partials_removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    op = "recover",
                    path = %entry.path.display(),
                    error = %e,
                    "could not remove partial batch"
                ),
            },
            FileState::Claimed if adopt_orphans => {
                let durable = entry.name.path_in(dir, FileState::Persisted);
                match fs::rename(&entry.path, &durable) {
                    Ok(()) => report.orphans_adopted += 1,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => warn!(
                        op = "recover",
                        path = %entry.path.display(),
                        error = %e,
                        "could not adopt orphaned batch"
                    ),
                }
            }
            FileState::Claimed | FileState::Persisted => {}
        }
    }
    Ok(report)
}

/// A spool directory with its writer, loader, purger and background tasks.
pub struct LocalStorage {
    config: SpoolConfig,
    clock: Arc<dyn Clock>,
    stats: Arc<dyn StorageStats>,
    index: Arc<FileIndex>,
    writer: Arc<Writer>,
    loader: Arc<Loader>,
    purger: Arc<Purger>,
    recovery: RecoveryReport,
    tasks: Vec<PeriodicTask>,
}

impl LocalStorage {
    /// Open `config.dir` with the system clock and no stats sink.
    pub fn open(config: SpoolConfig) -> Result<Self> {
        Self::open_with(config, Arc::new(SystemClock), Arc::new(NoopStats))
    }

    /// Open `config.dir`, creating it if needed, clean up after any crash,
    /// and seed the index from the durable files found there.
    pub fn open_with(
        config: SpoolConfig,
        clock: Arc<dyn Clock>,
        stats: Arc<dyn StorageStats>,
    ) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.dir).map_err(|e| Error::io_at(&config.dir, e))?;

        let recovery = recover_dir(&config.dir, config.recover_orphans)?;
        let index = Arc::new(FileIndex::new());
        let indexed = index
            .seed_from_disk(&config.dir)
            .map_err(|e| Error::io_at(&config.dir, e))?;

        info!(
            dir = %config.dir.display(),
            indexed,
            partials_removed = recovery.partials_removed,
            orphans_adopted = recovery.orphans_adopted,
            "spool opened"
        );

        let writer = Arc::new(Writer::new(
            &config,
            Arc::clone(&index),
            Arc::clone(&clock),
            Arc::clone(&stats),
        ));
        let loader = Arc::new(Loader::new(&config, Arc::clone(&index), Arc::clone(&stats)));
        let purger =
            Arc::new(Purger::new(&config, Arc::clone(&clock)).with_index(Arc::clone(&index)));

        Ok(LocalStorage {
            config,
            clock,
            stats,
            index,
            writer,
            loader,
            purger,
            recovery,
            tasks: Vec::new(),
        })
    }

    /// Start the resend and purge tasks. Calling it again is a no-op.
    pub fn start(&mut self, pipeline: Arc<dyn DeliveryPipeline>) -> Result<()> {
        if !self.tasks.is_empty() {
            return Ok(());
        }

        let sender = RetrySender::new(
            Arc::clone(&self.loader),
            pipeline,
            self.config.send_timeout(),
        );
        let send_interval = self.config.send_interval();
        let send_task = PeriodicTask::spawn("spool-sender", send_interval, send_interval, move || {
            sender.run_once();
        })?;

        let purger = Arc::clone(&self.purger);
        let purge_interval = self.config.purge_interval();
        let purge_task =
            PeriodicTask::spawn("spool-purger", purge_interval, purge_interval, move || {
                purger.sweep();
            })?;

        self.tasks = vec![send_task, purge_task];
        Ok(())
    }

    /// Stop both tasks. An in-flight resend finishes or times out first.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(PeriodicTask::is_running)
    }

    /// Listener to register with the live delivery pipeline.
    pub fn spill_listener(&self) -> SpillListener {
        SpillListener::new(Arc::clone(&self.writer))
    }

    pub fn status(&self) -> io::Result<SpoolStatus> {
        SpoolStatus::collect(&self.config, self.clock.as_ref())
    }

    pub fn config(&self) -> &SpoolConfig {
        &self.config
    }

    pub fn recovery(&self) -> RecoveryReport {
        self.recovery
    }

    pub fn stats(&self) -> &Arc<dyn StorageStats> {
        &self.stats
    }

    pub fn index(&self) -> &Arc<FileIndex> {
        &self.index
    }

    pub fn writer(&self) -> &Arc<Writer> {
        &self.writer
    }

    pub fn loader(&self) -> &Arc<Loader> {
        &self.loader
    }

    pub fn purger(&self) -> &Arc<Purger> {
        &self.purger
    }
}
