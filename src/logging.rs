// src/logging.rs

//! Logging setup for `orchestrator` using `tracing` + `tracing-subscriber`.
//!
//! The filter is the first of these that parses:
//! 1. `--log-level` CLI flag
//! 2. `ORCHESTRATOR_LOG`, any `EnvFilter` directive
//!    (e.g. `"debug"` or `"orchestrator::engine=trace,info"`)
//! 3. `RUST_LOG`
//! 4. `info`
//!
//! Logs go to STDERR; stdout is reserved for `--emit-events` and dry-run
//! output.

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "ORCHESTRATOR_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Initialise the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = build_filter(
        cli_level,
        std::env::var(LOG_ENV_VAR).ok().as_deref(),
        std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref(),
    );

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing tracing subscriber: {e}"))
}

/// Resolve the filter from the CLI level and the two env var values.
///
/// Unparseable env values are skipped rather than rejected.
pub fn build_filter(
    cli_level: Option<LogLevel>,
    orchestrator_log: Option<&str>,
    rust_log: Option<&str>,
) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(directive(level));
    }

    [orchestrator_log, rust_log]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .find_map(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}

fn directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
