//! Command implementations.
//!
//! Each command works directly on the spool directory named by the resolved
//! config. They are safe to run next to a live agent except `recover`, which
//! adopts `.tmp` files that a running sender may still own.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use spool_common::{ConfigSource, Error, FileState, SpoolConfig};
use spool_store::{
    fs_util, inspect_batch, recover_dir, BatchInfo, Clock, PurgeCandidate, PurgeReport, Purger,
    SpoolStatus, SystemClock,
};
use tracing::info;

use crate::exit_codes::ExitCode;
use crate::output::{format_age, format_bytes, CliError, Render};

// ============================================================================
// status
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatusOutput {
    pub config_source: ConfigSource,
    #[serde(flatten)]
    pub status: SpoolStatus,
}

pub fn status(config: &SpoolConfig, source: ConfigSource) -> Result<StatusOutput, CliError> {
    let status =
        SpoolStatus::collect(config, &SystemClock).map_err(|e| Error::io_at(&config.dir, e))?;
    Ok(StatusOutput {
        config_source: source,
        status,
    })
}

impl Render for StatusOutput {
    fn to_human(&self) -> String {
        let s = &self.status;
        let mut out = String::new();
        let _ = writeln!(out, "spool: {} (config: {})", s.dir, self.config_source);
        for state in FileState::ALL {
            let usage = s.usage(state);
            let _ = writeln!(
                out,
                "  {:<10} {:>6} files  {:>10}",
                state.to_string(),
                usage.files,
                format_bytes(usage.bytes)
            );
        }
        let _ = writeln!(
            out,
            "  quota      {} of {} ({:.1}%)",
            format_bytes(s.usage(FileState::Persisted).bytes),
            format_bytes(s.quota_bytes),
            s.quota_used_pct
        );
        match s.oldest_persisted_age_secs {
            Some(age) => {
                let _ = writeln!(out, "  oldest     {}", format_age(age));
            }
            None => {
                let _ = writeln!(out, "  oldest     -");
            }
        }
        let _ = writeln!(
            out,
            "  expired    {} files, {} (expiry {})",
            s.expired_files,
            format_bytes(s.expired_bytes),
            format_age(s.expiry_secs)
        );
        out
    }
}

// ============================================================================
// purge
// ============================================================================

#[derive(Debug, Serialize)]
pub struct PurgeOutput {
    pub dir: String,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<PurgeCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<PurgeReport>,
}

pub fn purge(config: &SpoolConfig, dry_run: bool) -> Result<PurgeOutput, CliError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let purger = Purger::new(config, clock);
    let dir = config.dir.display().to_string();

    if dry_run {
        let candidates = purger.preview()?;
        info!(dir = %dir, candidates = candidates.len(), "purge preview");
        return Ok(PurgeOutput {
            dir,
            dry_run,
            candidates,
            report: None,
        });
    }

    // A sweep never fails as a whole; make sure the directory is readable first.
    fs_util::scan_dir(&config.dir).map_err(|e| Error::io_at(&config.dir, e))?;
    let report = purger.sweep();
    Ok(PurgeOutput {
        dir,
        dry_run,
        candidates: Vec::new(),
        report: Some(report),
    })
}

impl Render for PurgeOutput {
    fn to_human(&self) -> String {
        let mut out = String::new();
        if self.dry_run {
            let total: u64 = self.candidates.iter().map(|c| c.size_bytes).sum();
            let _ = writeln!(
                out,
                "would purge {} expired batches ({}) from {}",
                self.candidates.len(),
                format_bytes(total),
                self.dir
            );
            for c in &self.candidates {
                let _ = writeln!(
                    out,
                    "  {}  {:>10}  age {}",
                    c.path.display(),
                    format_bytes(c.size_bytes),
                    format_age(c.age_secs)
                );
            }
        } else if let Some(r) = &self.report {
            let _ = writeln!(
                out,
                "purged {} of {} batches ({}) from {}",
                r.removed,
                r.scanned,
                format_bytes(r.bytes_freed),
                self.dir
            );
            if r.failed > 0 {
                let _ = writeln!(out, "  {} expired batches could not be deleted", r.failed);
            }
        }
        out
    }

    fn exit_code(&self) -> ExitCode {
        match &self.report {
            Some(r) if r.failed > 0 => ExitCode::OperationalError,
            _ => ExitCode::Clean,
        }
    }
}

// ============================================================================
// recover
// ============================================================================

#[derive(Debug, Serialize)]
pub struct RecoverOutput {
    pub dir: String,
    pub partials_removed: usize,
    pub orphans_adopted: usize,
    pub persisted_files: usize,
}

pub fn recover(config: &SpoolConfig) -> Result<RecoverOutput, CliError> {
    let report = recover_dir(&config.dir, true)?;
    let persisted = fs_util::list_state(&config.dir, FileState::Persisted)
        .map_err(|e| Error::io_at(&config.dir, e))?;
    info!(
        dir = %config.dir.display(),
        partials_removed = report.partials_removed,
        orphans_adopted = report.orphans_adopted,
        "spool directory recovered"
    );
    Ok(RecoverOutput {
        dir: config.dir.display().to_string(),
        partials_removed: report.partials_removed,
        orphans_adopted: report.orphans_adopted,
        persisted_files: persisted.len(),
    })
}

impl Render for RecoverOutput {
    fn to_human(&self) -> String {
        format!(
            "recovered {}: removed {} partial writes, adopted {} claimed batches, {} batches queued\n",
            self.dir, self.partials_removed, self.orphans_adopted, self.persisted_files
        )
    }
}

// ============================================================================
// inspect
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ListedBatch {
    pub name: String,
    pub state: FileState,
    pub size_bytes: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub age_secs: u64,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum InspectOutput {
    Batch(BatchInfo),
    Listing { dir: String, batches: Vec<ListedBatch> },
}

/// Inspect one batch file, or list every batch file when `path` is `None`.
///
/// A relative `path` that does not exist is looked up inside the spool dir.
pub fn inspect(config: &SpoolConfig, path: Option<&Path>) -> Result<InspectOutput, CliError> {
    if let Some(path) = path {
        let resolved: PathBuf = if path.is_relative() && !path.exists() {
            config.dir.join(path)
        } else {
            path.to_path_buf()
        };
        return Ok(InspectOutput::Batch(inspect_batch(&resolved)?));
    }

    let now = SystemClock.now_millis();
    let entries = fs_util::scan_dir(&config.dir).map_err(|e| Error::io_at(&config.dir, e))?;
    let batches = entries
        .into_iter()
        .map(|e| ListedBatch {
            name: e.name.file_name(e.state),
            state: e.state,
            size_bytes: e.size_bytes,
            created_at: e.name.created_at(),
            age_secs: (now.saturating_sub(e.name.created_millis()).max(0) / 1000) as u64,
        })
        .collect();
    Ok(InspectOutput::Listing {
        dir: config.dir.display().to_string(),
        batches,
    })
}

impl Render for InspectOutput {
    fn to_human(&self) -> String {
        let mut out = String::new();
        match self {
            InspectOutput::Batch(info) => {
                let _ = writeln!(out, "path     {}", info.path.display());
                let _ = writeln!(out, "state    {}", info.state);
                let created = info
                    .created_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                let _ = writeln!(out, "created  {}", created);
                let _ = writeln!(out, "ikey     {}", info.instrumentation_key);
                let _ = writeln!(out, "payload  {}", format_bytes(info.payload_bytes));
            }
            InspectOutput::Listing { dir, batches } => {
                let _ = writeln!(out, "{} batch files in {}", batches.len(), dir);
                for b in batches {
                    let _ = writeln!(
                        out,
                        "  {:<52} {:<10} {:>10}  age {}",
                        b.name,
                        b.state.to_string(),
                        format_bytes(b.size_bytes),
                        format_age(b.age_secs)
                    );
                }
            }
        }
        out
    }
}
