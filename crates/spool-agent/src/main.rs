//! spool - inspect and maintain a telemetry spool directory.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use spool_agent::commands;
use spool_agent::{
    emit, emit_error, init_logging, CliError, ExitCode, LogConfig, LogFormat, LogLevel,
    OutputFormat,
};
use spool_common::ConfigResolver;
use tracing::debug;

/// Inspect and maintain the disk-backed telemetry retry queue
#[derive(Parser)]
#[command(name = "spool")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to a spool.toml config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the spool directory
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, value_enum, default_value_t = OutputFormat::Human)]
    format: OutputFormat,

    /// Log level for stderr (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format for stderr (human, jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show file counts, quota usage and expiry backlog
    Status,

    /// Delete durable batches older than the expiry threshold
    Purge(PurgeArgs),

    /// Remove partial writes and return claimed batches to the queue
    ///
    /// Only run this while no agent is using the directory.
    Recover,

    /// Show one batch file's header, or list every batch file
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct PurgeArgs {
    /// List what would be deleted without deleting it
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Batch file, absolute or relative to the spool directory
    path: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::from_env(cli.global.log_level, cli.global.log_format);
    init_logging(&log_config);

    let exit_code = run(&cli);
    std::process::exit(exit_code.as_i32());
}

fn run(cli: &Cli) -> ExitCode {
    let format = cli.global.format;
    let resolver = ConfigResolver::new(cli.global.config.clone(), cli.global.dir.clone());
    let (config, source) = match resolver.load() {
        Ok(resolved) => resolved,
        Err(e) => return emit_error(format, &CliError::from(e)),
    };
    debug!(dir = %config.dir.display(), source = %source, "config resolved");

    let result = match &cli.command {
        Commands::Status => commands::status(&config, source).map(|out| emit(format, &out)),
        Commands::Purge(args) => {
            commands::purge(&config, args.dry_run).map(|out| emit(format, &out))
        }
        Commands::Recover => commands::recover(&config).map(|out| emit(format, &out)),
        Commands::Inspect(args) => {
            commands::inspect(&config, args.path.as_deref()).map(|out| emit(format, &out))
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => emit_error(format, &e),
    }
}
