//! Output formats and printing for command results.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use spool_store::StorageError;

use crate::exit_codes::ExitCode;

/// Output format for command results on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Aligned text for terminals.
    #[default]
    Human,
    /// Pretty-printed JSON.
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Human => write!(f, "human"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Errors a command can end with.
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Spool(#[from] spool_common::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CliError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Spool(e) => ExitCode::for_category(e.category()),
            CliError::Storage(_) => ExitCode::OperationalError,
        }
    }
}

/// A command result that can be printed in either format.
pub trait Render: Serialize {
    fn to_human(&self) -> String;

    /// Exit code to use after printing. Most results are plain success.
    fn exit_code(&self) -> ExitCode {
        ExitCode::Clean
    }
}

/// Print `result` to stdout and return its exit code.
pub fn emit<R: Render>(format: OutputFormat, result: &R) -> ExitCode {
    match format {
        OutputFormat::Human => print!("{}", result.to_human()),
        OutputFormat::Json => match serde_json::to_string_pretty(result) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("spool: error: could not serialize output: {}", e);
                return ExitCode::OperationalError;
            }
        },
    }
    result.exit_code()
}

/// Report `err` and return its exit code.
pub fn emit_error(format: OutputFormat, err: &CliError) -> ExitCode {
    let code = err.exit_code();
    match format {
        OutputFormat::Human => eprintln!("spool: error: {}", err),
        OutputFormat::Json => {
            let body = serde_json::json!({
                "error": {
                    "code": code.code_name(),
                    "exit_code": code.as_i32(),
                    "message": err.to_string(),
                }
            });
            println!("{}", body);
        }
    }
    code
}

/// Render a byte count with a binary unit.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Render an age in seconds as `3d 4h`, `2h 5m`, `42s`.
pub fn format_age(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs % 60)
    } else {
        format!("{}s", secs)
    }
}
