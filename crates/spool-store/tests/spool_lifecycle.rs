//! End-to-end tests for the spill → resend → purge lifecycle.
//!
//! Validates:
//! - Round trip of a batch through writer and loader
//! - Exactly-once claims under concurrent loaders
//! - Quota enforcement and failure counters
//! - Purger never touches claimed files and ignores mtime
//! - Crash recovery on open (`.part` cleanup, `.tmp` adoption)
//! - Background tasks drain the queue against a live pipeline

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use spool_common::{InstrumentationKey, SpoolConfig};
use spool_store::{
    BatchStatus, CountingStats, DeliveryHandle, DeliveryOutcome, DeliveryPipeline, FileIndex,
    LocalStorage, Loader, ManualClock, NoopStats, PersistOutcome, Purger, StatusUpdate, Writer,
};
use tempfile::tempdir;

// ============================================================================
// Helpers
// ============================================================================

const ZERO_KEY: &str = "00000000-0000-0000-0000-000000000000";
const NOW: i64 = 1_700_000_000_000;
const HOUR: Duration = Duration::from_secs(3600);

fn key() -> InstrumentationKey {
    InstrumentationKey::parse(ZERO_KEY).unwrap()
}

fn config(dir: &Path) -> SpoolConfig {
    let mut config = SpoolConfig::for_dir(dir);
    config.delete_retry_backoff_ms = 0;
    config
}

struct Parts {
    index: Arc<FileIndex>,
    writer: Writer,
    loader: Loader,
    purger: Purger,
    clock: Arc<ManualClock>,
    stats: Arc<CountingStats>,
}

fn parts(config: &SpoolConfig) -> Parts {
    let index = Arc::new(FileIndex::new());
    let clock = Arc::new(ManualClock::new(NOW));
    let stats = Arc::new(CountingStats::new());
    Parts {
        writer: Writer::new(config, Arc::clone(&index), clock.clone(), stats.clone()),
        loader: Loader::new(config, Arc::clone(&index), stats.clone()),
        purger: Purger::new(config, clock.clone()).with_index(Arc::clone(&index)),
        index,
        clock,
        stats,
    }
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

// ============================================================================
// Writer and loader
// ============================================================================

#[test]
fn round_trip_key_and_payload() {
    let dir = tempdir().unwrap();
    let p = parts(&config(dir.path()));

    assert!(p.writer.persist(&key(), &[1, 2, 3, 4, 5]).is_persisted());
    let batch = p.loader.load_next().unwrap();
    assert_eq!(batch.key().as_str(), ZERO_KEY);
    assert_eq!(batch.payload(), &[1, 2, 3, 4, 5]);
    assert!(p.loader.load_next().is_none());
}

#[test]
fn header_only_file_is_never_returned() {
    let dir = tempdir().unwrap();
    let p = parts(&config(dir.path()));
    let path = dir.path().join("100-abc.trn");
    fs::write(&path, ZERO_KEY.as_bytes()).unwrap();
    p.index.enqueue(path);

    assert!(p.loader.load_next().is_none());
    assert!(p.loader.load_next().is_none());
    assert!(files_in(dir.path()).is_empty());
    assert_eq!(p.stats.read_failures(), 1);
}

#[test]
fn persist_at_quota_creates_nothing() {
    let dir = tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.max_size_bytes = 41;
    let p = parts(&cfg);

    // 36-byte header + 5-byte payload fills the quota exactly.
    assert!(p.writer.persist(&key(), &[1, 2, 3, 4, 5]).is_persisted());
    let before = files_in(dir.path());

    let outcome = p.writer.persist(&key(), &[6]);
    assert_eq!(outcome, PersistOutcome::QuotaExceeded { used: 41, quota: 41 });
    assert_eq!(files_in(dir.path()), before);
    assert_eq!(p.stats.write_failures(), 1);
}

#[test]
fn concurrent_persist_both_loadable() {
    let dir = tempdir().unwrap();
    let p = Arc::new(parts(&config(dir.path())));

    let handles: Vec<_> = [b"left".to_vec(), b"right".to_vec()]
        .into_iter()
        .map(|payload| {
            let p = Arc::clone(&p);
            thread::spawn(move || p.writer.persist(&key(), &payload))
        })
        .collect();
    for h in handles {
        assert!(h.join().unwrap().is_persisted());
    }

    let mut payloads = vec![
        p.loader.load_next().unwrap().payload().to_vec(),
        p.loader.load_next().unwrap().payload().to_vec(),
    ];
    payloads.sort();
    assert_eq!(payloads, vec![b"left".to_vec(), b"right".to_vec()]);
}

#[test]
fn concurrent_loaders_claim_each_batch_once() {
    let dir = tempdir().unwrap();
    let p = Arc::new(parts(&config(dir.path())));
    for i in 0..60u8 {
        assert!(p.writer.persist(&key(), &[i]).is_persisted());
    }

    let claimed = Arc::new(Mutex::new(Vec::new()));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let p = Arc::clone(&p);
            let claimed = Arc::clone(&claimed);
            thread::spawn(move || {
                while let Some(batch) = p.loader.load_next() {
                    claimed.lock().unwrap().push(batch.payload()[0]);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let claimed = claimed.lock().unwrap();
    let unique: HashSet<_> = claimed.iter().copied().collect();
    assert_eq!(claimed.len(), 60);
    assert_eq!(unique.len(), 60);
}

#[test]
fn retryable_failure_is_loaded_again() {
    let dir = tempdir().unwrap();
    let p = parts(&config(dir.path()));
    p.writer.persist(&key(), b"again");

    let first = p.loader.load_next().unwrap();
    let update = p
        .loader
        .update_status(first.claimed_path(), BatchStatus::RetryableFailure);
    assert!(matches!(update, StatusUpdate::Requeued(_)));

    let second = p.loader.load_next().unwrap();
    assert_eq!(second.payload(), b"again");
    assert_eq!(second.claimed_path(), first.claimed_path());
}

#[test]
fn success_twice_is_a_noop() {
    let dir = tempdir().unwrap();
    let p = parts(&config(dir.path()));
    p.writer.persist(&key(), b"once");
    let batch = p.loader.load_next().unwrap();

    assert_eq!(
        p.loader.update_status(batch.claimed_path(), BatchStatus::Success),
        StatusUpdate::Deleted
    );
    assert_eq!(
        p.loader.update_status(batch.claimed_path(), BatchStatus::Success),
        StatusUpdate::Missing
    );
    assert!(files_in(dir.path()).is_empty());
}

// ============================================================================
// Purger
// ============================================================================

#[test]
fn expired_batch_is_swept_and_never_loaded() {
    let dir = tempdir().unwrap();
    let p = parts(&config(dir.path()));
    p.writer.persist(&key(), b"stale");

    p.clock.advance(49 * HOUR);
    let report = p.purger.sweep();
    assert_eq!(report.removed, 1);
    assert!(p.index.is_empty());
    assert!(p.loader.load_next().is_none());
    assert!(files_in(dir.path()).is_empty());
}

#[test]
fn claimed_batch_survives_sweep() {
    let dir = tempdir().unwrap();
    let p = parts(&config(dir.path()));
    p.writer.persist(&key(), b"in flight");
    let batch = p.loader.load_next().unwrap();

    p.clock.advance(100 * HOUR);
    let report = p.purger.sweep();
    assert_eq!(report.scanned, 0);
    assert_eq!(report.removed, 0);
    assert!(batch.claimed_path().exists());

    // Retry returns it to the durable set; the next sweep takes it.
    p.loader
        .update_status(batch.claimed_path(), BatchStatus::RetryableFailure);
    assert_eq!(p.purger.sweep().removed, 1);
}

#[test]
fn purge_age_comes_from_name_not_mtime() {
    let dir = tempdir().unwrap();
    let p = parts(&config(dir.path()));
    let PersistOutcome::Persisted(path) = p.writer.persist(&key(), b"fresh") else {
        panic!("persist failed");
    };

    let ancient = filetime::FileTime::from_system_time(
        SystemTime::now() - Duration::from_secs(30 * 86400),
    );
    filetime::set_file_times(&path, ancient, ancient).unwrap();

    assert!(p.purger.preview().unwrap().is_empty());
    assert_eq!(p.purger.sweep().removed, 0);
    assert!(path.exists());
}

// ============================================================================
// LocalStorage
// ============================================================================

#[test]
fn open_recovers_after_crash() {
    let dir = tempdir().unwrap();
    let mut batch = ZERO_KEY.as_bytes().to_vec();
    batch.extend_from_slice(b"payload");
    fs::write(dir.path().join("100-aaa.tmp"), &batch).unwrap();
    fs::write(dir.path().join("200-bbb.trn"), &batch).unwrap();
    fs::write(dir.path().join("300-ccc.part"), b"half").unwrap();

    let storage = LocalStorage::open(config(dir.path())).unwrap();
    assert_eq!(storage.recovery().partials_removed, 1);
    assert_eq!(storage.recovery().orphans_adopted, 1);
    assert_eq!(files_in(dir.path()), vec!["100-aaa.trn", "200-bbb.trn"]);

    let order: Vec<PathBuf> = storage.index().snapshot();
    assert_eq!(
        order,
        vec![dir.path().join("100-aaa.trn"), dir.path().join("200-bbb.trn")]
    );
}

#[test]
fn open_without_adoption_keeps_claimed_out_of_queue() {
    let dir = tempdir().unwrap();
    let mut batch = ZERO_KEY.as_bytes().to_vec();
    batch.extend_from_slice(b"payload");
    fs::write(dir.path().join("100-aaa.tmp"), &batch).unwrap();

    let mut cfg = config(dir.path());
    cfg.recover_orphans = false;
    let storage = LocalStorage::open(cfg).unwrap();
    assert!(storage.index().is_empty());
    assert!(dir.path().join("100-aaa.tmp").exists());
}

/// Accepts everything after the first `failures` sends.
struct Flaky {
    failures: Mutex<usize>,
    delivered: Mutex<Vec<Vec<u8>>>,
}

impl DeliveryPipeline for Flaky {
    fn send(&self, payload: Vec<u8>, _key: &InstrumentationKey) -> DeliveryHandle {
        let mut failures = self.failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return DeliveryHandle::ready(DeliveryOutcome::status(503));
        }
        self.delivered.lock().unwrap().push(payload);
        DeliveryHandle::ready(DeliveryOutcome::status(200))
    }
}

#[test]
fn background_sender_drains_queue() {
    let dir = tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.send_interval_secs = 1;
    cfg.send_timeout_secs = 1;

    let stats = Arc::new(CountingStats::new());
    let mut storage =
        LocalStorage::open_with(cfg, Arc::new(spool_store::SystemClock), stats.clone()).unwrap();

    let listener = storage.spill_listener();
    listener.spill(b"one", &key(), &DeliveryOutcome::status(500));
    listener.spill(b"dropped", &key(), &DeliveryOutcome::status(200));
    assert_eq!(storage.index().len(), 1);

    let pipeline = Arc::new(Flaky {
        failures: Mutex::new(1),
        delivered: Mutex::new(Vec::new()),
    });
    storage.start(pipeline.clone()).unwrap();
    assert!(storage.is_running());

    let deadline = Instant::now() + Duration::from_secs(15);
    while pipeline.delivered.lock().unwrap().is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(50));
    }
    storage.shutdown();
    assert!(!storage.is_running());

    assert_eq!(*pipeline.delivered.lock().unwrap(), vec![b"one".to_vec()]);
    assert!(files_in(dir.path()).is_empty());
    assert_eq!(stats.write_failures(), 0);
}

#[test]
fn status_reflects_spool_contents() {
    let dir = tempdir().unwrap();
    let storage =
        LocalStorage::open_with(config(dir.path()), Arc::new(ManualClock::new(NOW)), Arc::new(NoopStats))
            .unwrap();
    storage.writer().persist(&key(), &[0u8; 64]);
    storage.writer().persist(&key(), &[0u8; 64]);

    let status = storage.status().unwrap();
    let persisted = status.usage(spool_common::FileState::Persisted);
    assert_eq!(persisted.files, 2);
    assert_eq!(persisted.bytes, 2 * (36 + 64));
    assert_eq!(status.oldest_persisted_age_secs, Some(0));
}
