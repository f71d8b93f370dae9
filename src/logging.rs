// src/logging.rs

//! Logging setup for `tuttle` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `TUTTLE_LOG` environment variable, which accepts full filter
//!    directives (e.g. `"debug"` or `"tuttle=debug,tuttle::process=warn"`)
//! 3. default to `info`
//!
//! Everything goes to STDERR; stdout is reserved for the user-facing summary.
//! Lines streamed from process log files use the [`PROCESS_OUTPUT_TARGET`]
//! target so they can be silenced independently.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

/// Tracing target used for lines tailed from process stdout/stderr files.
pub const PROCESS_OUTPUT_TARGET: &str = "tuttle::process";

/// Environment variable consulted when no `--log-level` is given.
pub const LOG_ENV_VAR: &str = "TUTTLE_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(lvl) => EnvFilter::new(directive_for(lvl)),
        None => match std::env::var(LOG_ENV_VAR) {
            Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(&directives)
                .with_context(|| format!("invalid {LOG_ENV_VAR} value: {directives:?}"))?,
            _ => EnvFilter::new("info"),
        },
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn directive_for(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
