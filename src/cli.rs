// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `orchestrator`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "orchestrator",
    version,
    about = "Run a DAG of jobs across workers with retries and schema-checked payloads.",
    long_about = None
)]
pub struct CliArgs {
    /// Config file or directory of `*.toml` files.
    ///
    /// Default: `ORCHESTRATOR_CONFIG`, else `config` in the working directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Schema directory. Overrides `orchestrator.schemas_dir`.
    #[arg(long, value_name = "PATH")]
    pub schemas: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ORCHESTRATOR_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate config, schemas and payloads, print the DAG, run nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Print every bus event as a JSON line on stdout.
    #[arg(long)]
    pub emit_events: bool,
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
