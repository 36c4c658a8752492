#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use orchestrator::bus::EventBus;
use orchestrator::config::{ConfigFile, JobConfig, RawConfigFile, WorkerConfig};
use orchestrator::dag::{JobGraph, JobSpec};
use orchestrator::engine::{RetryPolicy, Scheduler, SchedulerOptions, WorkerPool};
use orchestrator::schema::SchemaRegistry;
use orchestrator::types::TaskKind;
use tokio::time::Instant;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_job(mut self, name: &str, job: JobConfig) -> Self {
        self.config.job.insert(name.to_string(), job);
        self
    }

    pub fn with_worker(mut self, id: &str, worker: WorkerConfig) -> Self {
        self.config.worker.insert(id.to_string(), worker);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.retry.max_retries = n;
        self
    }

    pub fn base_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry.base_backoff_ms = ms;
        self
    }

    pub fn tick_interval_ms(mut self, ms: u64) -> Self {
        self.config.orchestrator.tick_interval_ms = ms;
        self
    }

    pub fn max_in_flight(mut self, n: usize) -> Self {
        self.config.orchestrator.max_in_flight = n;
        self
    }

    pub fn heartbeat_timeout_ms(mut self, ms: u64) -> Self {
        self.config.workers.heartbeat_timeout_ms = ms;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `JobConfig`.
pub struct JobConfigBuilder {
    job: JobConfig,
}

impl JobConfigBuilder {
    pub fn new() -> Self {
        Self {
            job: JobConfig::default(),
        }
    }

    pub fn command(cmd: &str) -> Self {
        Self::new().task(TaskKind::Command {
            cmd: cmd.to_string(),
        })
    }

    pub fn task(mut self, task: TaskKind) -> Self {
        self.job.task = task;
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.job.after.push(dep.to_string());
        self
    }

    pub fn requires(mut self, tag: &str) -> Self {
        self.job.requires.push(tag.to_string());
        self
    }

    pub fn schema(mut self, name: &str) -> Self {
        self.job.schema = Some(name.to_string());
        self
    }

    pub fn param(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
        self.job.params.insert(key.to_string(), value.into());
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.job.max_retries = Some(n);
        self
    }

    pub fn build(self) -> JobConfig {
        self.job
    }
}

impl Default for JobConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A worker config with the given capacity and capability tags.
pub fn worker(capacity: usize, capabilities: &[&str]) -> WorkerConfig {
    WorkerConfig {
        capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        capacity,
    }
}

/// Builder for a `Scheduler` over in-memory jobs and workers, bypassing
/// config files.
pub struct SchedulerBuilder {
    jobs: Vec<JobSpec>,
    workers: Vec<(String, Vec<String>, usize)>,
    retry: RetryPolicy,
    max_in_flight: usize,
    degraded_after: Duration,
    timeout: Duration,
    schemas: SchemaRegistry,
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            workers: Vec::new(),
            retry: RetryPolicy {
                base_backoff: Duration::from_millis(100),
                ..RetryPolicy::default()
            },
            max_in_flight: 16,
            degraded_after: Duration::from_millis(1_500),
            timeout: Duration::from_millis(3_000),
            schemas: SchemaRegistry::default(),
        }
    }

    pub fn job(mut self, spec: JobSpec) -> Self {
        self.jobs.push(spec);
        self
    }

    pub fn worker(mut self, id: &str, capacity: usize, capabilities: &[&str]) -> Self {
        self.workers.push((
            id.to_string(),
            capabilities.iter().map(|c| c.to_string()).collect(),
            capacity,
        ));
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.retry.max_retries = n;
        self
    }

    pub fn max_in_flight(mut self, n: usize) -> Self {
        self.max_in_flight = n;
        self
    }

    pub fn heartbeat_windows(mut self, degraded_after: Duration, timeout: Duration) -> Self {
        self.degraded_after = degraded_after;
        self.timeout = timeout;
        self
    }

    pub fn schemas(mut self, schemas: SchemaRegistry) -> Self {
        self.schemas = schemas;
        self
    }

    /// Build with all worker heartbeat clocks starting at `now`.
    pub fn build(self, now: Instant) -> (Scheduler, EventBus) {
        let graph = JobGraph::build(self.jobs).expect("test graph should be valid");
        let mut pool = WorkerPool::new(self.degraded_after, self.timeout);
        for (id, caps, capacity) in self.workers {
            pool.register(id, caps, capacity, now);
        }
        let bus = EventBus::new();
        let options = SchedulerOptions {
            max_in_flight: self.max_in_flight,
            retry: self.retry,
        };
        let scheduler = Scheduler::new(graph, pool, Arc::new(self.schemas), bus.clone(), options);
        (scheduler, bus)
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
