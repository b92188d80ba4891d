//! Command-line surface of the mover binary.

use std::path::PathBuf;

use clap::Parser;

/// Threshold-driven two-tier cache mover.
#[derive(Debug, Parser)]
#[command(name = "strata", version, about)]
pub struct Cli {
    /// Path to the YAML configuration document.
    #[arg(long)]
    pub config: PathBuf,

    /// PID lock file guarding against concurrent runs.
    #[arg(long, default_value = "/tmp/strata.lock")]
    pub lock_file: PathBuf,

    /// Append JSON logs to this file instead of terminal output.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Log level when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log intended operations without touching files or clients.
    #[arg(long)]
    pub dry_run: bool,
}
