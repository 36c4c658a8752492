// src/errors.rs

//! Crate-wide error type and aliases.

use thiserror::Error;

use crate::types::{JobId, JobStatus};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Schema load error: {0}")]
    SchemaLoad(String),

    #[error("Schema validation error ({schema}): {reason}")]
    SchemaValidation { schema: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cycle detected in job graph: {}", .0.join(" -> "))]
    CycleDetected(Vec<JobId>),

    #[error("job '{job}' has unknown dependency '{dep}'")]
    UnknownDependency { job: JobId, dep: JobId },

    #[error("job '{0}' is defined more than once")]
    DuplicateJob(JobId),

    #[error("Job not found: {0}")]
    UnknownJob(JobId),

    #[error("invalid status transition for job '{job}': {from} -> {to}")]
    InvalidTransition {
        job: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("job '{job}' exhausted its retries after {attempts} attempts")]
    RetryExhausted { job: JobId, attempts: u32 },

    #[error("job '{job}' cancelled because upstream job '{upstream}' did not succeed")]
    CancellationPropagated { job: JobId, upstream: JobId },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors surfaced by the schema registry.
pub type SchemaError = OrchestratorError;
/// Errors surfaced by the configuration loader.
pub type ConfigError = OrchestratorError;
/// Errors surfaced by the job graph.
pub type GraphError = OrchestratorError;

pub type Result<T> = std::result::Result<T, OrchestratorError>;
