//! Operator tooling for spool directories.
//!
//! The `spool` binary inspects and maintains the on-disk retry queue used by
//! the telemetry forwarder. It shares the resolution order of the agent
//! itself: `--config`, then `SPOOL_CONFIG`, then the XDG config file, then
//! built-in defaults.

pub mod commands;
pub mod exit_codes;
pub mod logging;
pub mod output;

pub use exit_codes::ExitCode;
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
pub use output::{emit, emit_error, CliError, OutputFormat, Render};
