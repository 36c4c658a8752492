// src/dag/job.rs

//! Job definitions and per-run job state.

use serde::Serialize;

use crate::types::{JobId, JobStatus, TaskKind};

/// Static description of a job, as declared in config.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub id: JobId,
    /// Schema `params` must satisfy, if any.
    pub schema: Option<String>,
    /// Direct dependencies (jobs that must succeed first).
    pub after: Vec<JobId>,
    /// Capability tags required of the worker.
    pub requires: Vec<String>,
    pub params: toml::Table,
    pub task: TaskKind,
    /// Overrides the run-wide retry limit.
    pub max_retries: Option<u32>,
}

impl JobSpec {
    /// A schemaless no-op job with no dependencies.
    pub fn new(id: impl Into<JobId>) -> Self {
        Self {
            id: id.into(),
            schema: None,
            after: Vec::new(),
            requires: Vec::new(),
            params: toml::Table::new(),
            task: TaskKind::Noop,
            max_retries: None,
        }
    }

    pub fn after(mut self, dep: impl Into<JobId>) -> Self {
        self.after.push(dep.into());
        self
    }

    pub fn requires(mut self, tag: impl Into<String>) -> Self {
        self.requires.push(tag.into());
        self
    }

    pub fn schema(mut self, name: impl Into<String>) -> Self {
        self.schema = Some(name.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn task(mut self, task: TaskKind) -> Self {
        self.task = task;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }
}

/// A job plus its mutable run state.
///
/// Status is only changed through [`crate::dag::JobGraph`], which enforces the
/// transition rules.
#[derive(Debug, Clone)]
pub struct Job {
    pub(crate) spec: JobSpec,
    pub(crate) status: JobStatus,
    pub(crate) retry_count: u32,
}

impl Job {
    pub(crate) fn new(spec: JobSpec) -> Self {
        Self {
            spec,
            status: JobStatus::Pending,
            retry_count: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Number of retries consumed so far.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }
}

/// Terminal accounting for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Every job is terminal.
    pub complete: bool,
    /// Complete and no job failed.
    pub successful: bool,
}
