// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::types::JobCount;

/// Command-line arguments for `tuttle`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "tuttle",
    version,
    about = "Make for data: rebuild only what changed in a data pipeline.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TUTTLE_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Invalidate what changed since the last run, then run the workflow.
    Run(RunArgs),
    /// Remove resources (and everything depending on them) so they are rebuilt.
    Invalidate(InvalidateArgs),
}

/// Options shared by every command.
#[derive(Debug, Clone, Args)]
pub struct ProjectArgs {
    /// Path to the project file (TOML).
    #[arg(short = 'f', long = "file", value_name = "PATH", default_value = "tuttlefile")]
    pub tuttlefile: PathBuf,

    /// Directory where processes run and state is kept.
    #[arg(short = 'w', long, value_name = "DIR", default_value = ".")]
    pub workspace: PathBuf,

    /// Abort if invalidation would discard at least this many seconds of
    /// processing. `-1` disables the check.
    #[arg(
        short = 't',
        long,
        value_name = "SECONDS",
        default_value_t = -1,
        allow_negative_numbers = true
    )]
    pub threshold: i64,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Number of processes to run in parallel, or "auto".
    #[arg(short = 'j', long, value_name = "N", default_value = "1")]
    pub jobs: JobCount,

    /// Keep running independent processes after a failure.
    #[arg(short = 'k', long)]
    pub keep_going: bool,

    /// Also invalidate outputs modified outside of the workflow.
    #[arg(short = 'i', long)]
    pub check_integrity: bool,
}

#[derive(Debug, Clone, Args)]
pub struct InvalidateArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Resources to invalidate. Without urls, only invalidates what is no
    /// longer part of the project or has changed.
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,
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
