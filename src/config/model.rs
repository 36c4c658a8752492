// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::dag::JobSpec;
use crate::engine::retry::RetryPolicy;
use crate::types::TaskKind;

/// Top-level configuration as read from TOML (one file or a merged directory).
///
/// ```toml
/// [orchestrator]
/// tick_interval_ms = 100
/// max_in_flight = 8
///
/// [retry]
/// max_retries = 1
///
/// [worker.local]
/// capabilities = ["linux"]
/// capacity = 2
///
/// [job.fetch]
/// task = { kind = "command", cmd = "git fetch" }
///
/// [job.build]
/// schema = "build"
/// after = ["fetch"]
/// requires = ["linux"]
/// params = { target = "release" }
/// ```
///
/// All sections are optional and have reasonable defaults; semantic checks
/// happen when converting into a [`ConfigFile`].
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub orchestrator: OrchestratorSection,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub workers: WorkersSection,

    /// Worker endpoints from `[worker.<id>]`.
    #[serde(default)]
    pub worker: BTreeMap<String, WorkerConfig>,

    /// Jobs from `[job.<name>]`.
    #[serde(default)]
    pub job: BTreeMap<String, JobConfig>,
}

/// Validated, immutable configuration snapshot.
///
/// Only obtainable through `ConfigFile::try_from(RawConfigFile)` (see
/// `validate.rs`) or the loader, so holders can rely on its invariants.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub orchestrator: OrchestratorSection,
    pub retry: RetrySection,
    pub workers: WorkersSection,
    pub worker: BTreeMap<String, WorkerConfig>,
    pub job: BTreeMap<String, JobConfig>,
    /// Directory relative paths in the config are resolved against.
    pub base_dir: PathBuf,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            orchestrator: raw.orchestrator,
            retry: raw.retry,
            workers: raw.workers,
            worker: raw.worker,
            job: raw.job,
            base_dir: PathBuf::from("."),
        }
    }

    /// Set the directory that relative paths resolve against.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Job specs in declaration-key order.
    pub fn job_specs(&self) -> Vec<JobSpec> {
        self.job
            .iter()
            .map(|(name, jc)| JobSpec {
                id: name.clone(),
                schema: jc.schema.clone(),
                after: jc.after.clone(),
                requires: jc.requires.clone(),
                params: jc.params.clone(),
                task: jc.task.clone(),
                max_retries: jc.max_retries,
            })
            .collect()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            base_backoff: Duration::from_millis(self.retry.base_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
            multiplier: self.retry.multiplier,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.orchestrator.tick_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.workers.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.workers.heartbeat_timeout_ms)
    }

    /// Silence after which a worker counts as degraded (half the timeout
    /// unless configured).
    pub fn degraded_after(&self) -> Duration {
        Duration::from_millis(self.workers.effective_degraded_after_ms())
    }

    pub fn schemas_dir(&self) -> PathBuf {
        self.resolve(&self.orchestrator.schemas_dir)
    }

    pub fn record_log_path(&self) -> Option<PathBuf> {
        self.orchestrator.record_log.as_deref().map(|p| self.resolve(p))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

/// `[orchestrator]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSection {
    /// Scheduling loop period.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Upper bound on attempts in flight across all workers.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    #[serde(default = "default_schemas_dir")]
    pub schemas_dir: PathBuf,

    /// Optional JSON-lines file the execution record log is appended to.
    #[serde(default)]
    pub record_log: Option<PathBuf>,
}

fn default_tick_interval_ms() -> u64 {
    100
}

fn default_max_in_flight() -> usize {
    16
}

fn default_schemas_dir() -> PathBuf {
    PathBuf::from("schemas")
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            max_in_flight: default_max_in_flight(),
            schemas_dir: default_schemas_dir(),
            record_log: None,
        }
    }
}

/// `[retry]` section: bounded retries with exponential backoff.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

/// `[workers]` section: heartbeat timing shared by all workers.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkersSection {
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    #[serde(default)]
    pub degraded_after_ms: Option<u64>,
}

impl WorkersSection {
    /// `degraded_after_ms`, or half the timeout when unset.
    pub fn effective_degraded_after_ms(&self) -> u64 {
        self.degraded_after_ms
            .unwrap_or(self.heartbeat_timeout_ms / 2)
    }
}

fn default_heartbeat_interval_ms() -> u64 {
    500
}

fn default_heartbeat_timeout_ms() -> u64 {
    3_000
}

impl Default for WorkersSection {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            degraded_after_ms: None,
        }
    }
}

/// `[worker.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Capability tags matched against a job's `requires`.
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Maximum number of concurrent attempts on this worker.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    1
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            capabilities: Vec::new(),
            capacity: default_capacity(),
        }
    }
}

/// `[job.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct JobConfig {
    /// Name of the schema `params` must satisfy.
    #[serde(default)]
    pub schema: Option<String>,

    /// Jobs that must succeed before this one can run.
    #[serde(default)]
    pub after: Vec<String>,

    /// Capability tags a worker must carry to run this job.
    #[serde(default)]
    pub requires: Vec<String>,

    /// Per-job override of `[retry].max_retries`.
    #[serde(default)]
    pub max_retries: Option<u32>,

    #[serde(default)]
    pub params: toml::Table,

    #[serde(default)]
    pub task: TaskKind,
}
