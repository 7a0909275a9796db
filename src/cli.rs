// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `insightdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "insightdag",
    version,
    about = "Validate and run an analysis workflow graph, locally or against a remote job stream.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the workflow JSON file.
    #[arg(long, value_name = "PATH")]
    pub workflow: PathBuf,

    /// Path to the config file (TOML).
    ///
    /// Default: `Insightdag.toml` in the current working directory, if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Drive the run from a recorded NDJSON event file instead of local executors.
    #[arg(long, value_name = "PATH", conflicts_with = "remote")]
    pub replay: Option<PathBuf>,

    /// Start a remote job at `[remote].endpoint` and follow its event stream.
    #[arg(long)]
    pub remote: bool,

    /// Table asset the remote job analyses. Defaults to the workflow's table id.
    #[arg(long, value_name = "ID")]
    pub table_asset_id: Option<String>,

    /// Free-text intent forwarded to the remote job.
    #[arg(long, value_name = "TEXT")]
    pub intent: Option<String>,

    /// Validate the workflow and print its execution order without running it.
    #[arg(long)]
    pub dry_run: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `INSIGHTDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
