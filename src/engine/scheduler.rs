// src/engine/scheduler.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::bus::{EventBus, EventKind, ExecutionRecord, RecordOutcome, StatusCause};
use crate::config::ConfigFile;
use crate::dag::{JobGraph, RunSummary};
use crate::engine::pool::WorkerPool;
use crate::engine::queue::ReadyQueue;
use crate::engine::retry::RetryPolicy;
use crate::engine::{CancelFlag, Dispatch, Outcome, Task};
use crate::errors::{OrchestratorError, Result};
use crate::schema::SchemaRegistry;
use crate::types::{JobId, JobStatus, WorkerHealth, WorkerId};

/// Run-wide scheduling limits.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    /// Maximum attempts in flight across all workers.
    pub max_in_flight: usize,
    pub retry: RetryPolicy,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            max_in_flight: 16,
            retry: RetryPolicy::default(),
        }
    }
}

/// An attempt currently assigned to a worker.
#[derive(Debug, Clone)]
struct InFlight {
    worker: WorkerId,
    attempt: u32,
    started_at: DateTime<Utc>,
    cancel: CancelFlag,
}

/// Owns all mutable orchestration state for one run.
///
/// It is responsible for:
/// - promoting jobs whose dependencies succeeded into the ready queue
/// - assigning ready jobs to workers (capability match, least load)
/// - applying retry/backoff on failure and cancelling dependents when a job
///   fails for good
/// - tracking worker health and requeueing attempts lost with a worker
/// - publishing every status change and attempt record on the event bus
///
/// All methods are synchronous and take the current instant explicitly, so
/// the scheduler can be stepped deterministically in tests.
#[derive(Debug)]
pub struct Scheduler {
    graph: JobGraph,
    pool: WorkerPool,
    schemas: Arc<SchemaRegistry>,
    bus: EventBus,
    options: SchedulerOptions,
    queue: ReadyQueue,
    /// Jobs waiting out a retry backoff.
    backoff_until: HashMap<JobId, Instant>,
    in_flight: HashMap<JobId, InFlight>,
    /// Attempts of cancelled jobs still running on a worker; their results
    /// are discarded.
    discarding: HashMap<(JobId, u32), InFlight>,
    /// Attempts started per job.
    attempts: HashMap<JobId, u32>,
    /// Jobs that already used their one automatic reassignment.
    reassigned: HashSet<JobId>,
    run_finished: bool,
}

impl Scheduler {
    pub fn new(
        graph: JobGraph,
        pool: WorkerPool,
        schemas: Arc<SchemaRegistry>,
        bus: EventBus,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            graph,
            pool,
            schemas,
            bus,
            options,
            queue: ReadyQueue::new(),
            backoff_until: HashMap::new(),
            in_flight: HashMap::new(),
            discarding: HashMap::new(),
            attempts: HashMap::new(),
            reassigned: HashSet::new(),
            run_finished: false,
        }
    }

    /// Build graph and worker pool from a validated config.
    ///
    /// Fails on dependency errors, cycles, or jobs that reference a schema
    /// the registry does not know.
    pub fn from_config(
        cfg: &ConfigFile,
        schemas: Arc<SchemaRegistry>,
        bus: EventBus,
        now: Instant,
    ) -> Result<Self> {
        let specs = cfg.job_specs();
        schemas.check_references(&specs)?;
        let graph = JobGraph::build(specs)?;
        let pool = WorkerPool::from_config(
            cfg.worker.iter(),
            cfg.degraded_after(),
            cfg.heartbeat_timeout(),
            now,
        );
        let options = SchedulerOptions {
            max_in_flight: cfg.orchestrator.max_in_flight,
            retry: cfg.retry_policy(),
        };
        Ok(Self::new(graph, pool, schemas, bus, options))
    }

    pub fn graph(&self) -> &JobGraph {
        &self.graph
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn status(&self, job: &str) -> Option<JobStatus> {
        self.graph.status(job)
    }

    /// Jobs ready but not yet dispatched, in dispatch order.
    pub fn queued(&self) -> Vec<JobId> {
        self.queue.jobs()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Worker currently running `job`'s live attempt.
    pub fn assigned_worker(&self, job: &str) -> Option<&str> {
        self.in_flight.get(job).map(|f| f.worker.as_str())
    }

    /// Instant a job in backoff becomes eligible again.
    pub fn backoff_until(&self, job: &str) -> Option<Instant> {
        self.backoff_until.get(job).copied()
    }

    /// Every job is terminal.
    pub fn is_complete(&self) -> bool {
        self.graph.is_complete()
    }

    /// Complete, and no discarded attempt is still outstanding.
    pub fn is_finished(&self) -> bool {
        self.is_complete() && self.in_flight.is_empty() && self.discarding.is_empty()
    }

    pub fn summary(&self) -> RunSummary {
        self.graph.summary()
    }

    /// One scheduling pass: refresh worker health, promote ready jobs, and
    /// assign queued jobs to workers.
    ///
    /// Returns the attempts the caller must dispatch.
    pub fn tick(&mut self, now: Instant) -> Vec<Dispatch> {
        self.refresh_workers(now);
        self.enqueue_ready(now);
        let dispatches = self.assign();
        self.maybe_finish_run();
        dispatches
    }

    /// Apply the result of an attempt.
    ///
    /// Results for attempts that are no longer live (superseded after a
    /// worker loss) are ignored; results for cancelled jobs are recorded as
    /// discarded.
    pub fn handle_completion(
        &mut self,
        job: &str,
        attempt: u32,
        worker: &str,
        outcome: Outcome,
        now: Instant,
    ) {
        let live = self
            .in_flight
            .get(job)
            .is_some_and(|f| f.attempt == attempt && f.worker == worker);

        if !live {
            match self.discarding.remove(&(job.to_string(), attempt)) {
                Some(flight) => {
                    self.pool.release(&flight.worker);
                    debug!(job = %job, attempt, worker = %worker, "discarding result of cancelled job");
                    self.record(job, Some(&flight.worker), attempt, flight.started_at, RecordOutcome::Discarded);
                }
                None => {
                    warn!(job = %job, attempt, worker = %worker, "completion for an attempt that is no longer live; ignoring");
                }
            }
            self.maybe_finish_run();
            return;
        }

        let Some(flight) = self.in_flight.remove(job) else {
            return;
        };
        self.pool.release(&flight.worker);

        match outcome {
            Outcome::Succeeded => {
                info!(job = %job, attempt, worker = %worker, "job succeeded");
                self.record(job, Some(worker), attempt, flight.started_at, RecordOutcome::Succeeded);
                self.transition(job, JobStatus::Succeeded, None);
            }
            Outcome::Failed(reason) => {
                warn!(job = %job, attempt, worker = %worker, %reason, "attempt failed");
                self.record(job, Some(worker), attempt, flight.started_at, RecordOutcome::Failed { reason });
                self.fail_attempt(job, now);
            }
            Outcome::DispatchError(reason) => {
                warn!(job = %job, attempt, worker = %worker, %reason, "dispatch error");
                let err = OrchestratorError::Dispatch(reason.clone());
                debug!(job = %job, error = %err, "treating dispatch error as a retriable failure");
                self.record(job, Some(worker), attempt, flight.started_at, RecordOutcome::DispatchError { reason });
                self.fail_attempt(job, now);
            }
        }

        self.maybe_finish_run();
    }

    /// Record a heartbeat from `worker`.
    pub fn heartbeat(&mut self, worker: &str, now: Instant) {
        if let Some(change) = self.pool.heartbeat(worker, now) {
            self.bus.publish(EventKind::WorkerHealthChanged {
                worker: change.worker,
                from: change.from,
                to: change.to,
            });
        }
    }

    /// Cancel `job` and every non-terminal job downstream of it.
    ///
    /// Running attempts are not interrupted; their cancellation flag is raised
    /// and their results will be discarded. Returns the jobs that were
    /// cancelled (empty if `job` was already terminal).
    pub fn cancel(&mut self, job: &str) -> Result<Vec<JobId>> {
        let status = self
            .graph
            .status(job)
            .ok_or_else(|| OrchestratorError::UnknownJob(job.to_string()))?;

        if status.is_terminal() {
            debug!(job = %job, %status, "cancel requested for terminal job; nothing to do");
            return Ok(Vec::new());
        }

        let mut cancelled = Vec::new();
        if self.cancel_one(job, StatusCause::CancelRequested) {
            cancelled.push(job.to_string());
        }
        cancelled.extend(self.cancel_dependents(job));

        info!(job = %job, cancelled = cancelled.len(), "cancellation applied");
        self.maybe_finish_run();
        Ok(cancelled)
    }

    /// Cancel every non-terminal job.
    pub fn shutdown(&mut self) {
        let open: Vec<JobId> = self
            .graph
            .jobs()
            .filter(|j| !j.status().is_terminal())
            .map(|j| j.id().to_string())
            .collect();

        for job in &open {
            self.cancel_one(job, StatusCause::Shutdown);
        }
        info!(cancelled = open.len(), "shutdown: cancelled all open jobs");
        self.maybe_finish_run();
    }

    fn refresh_workers(&mut self, now: Instant) {
        for change in self.pool.refresh_health(now) {
            let lost = change.to == WorkerHealth::Unreachable;
            let worker = change.worker.clone();
            self.bus.publish(EventKind::WorkerHealthChanged {
                worker: change.worker,
                from: change.from,
                to: change.to,
            });
            if lost {
                self.handle_worker_lost(&worker, now);
            }
        }
    }

    /// Write off every attempt on an unreachable worker.
    ///
    /// A job's first loss requeues it without consuming a retry; a second
    /// loss counts as a dispatch failure.
    fn handle_worker_lost(&mut self, worker: &str, now: Instant) {
        let mut lost: Vec<(JobId, InFlight)> = self
            .in_flight
            .iter()
            .filter(|(_, f)| f.worker == worker)
            .map(|(j, f)| (j.clone(), f.clone()))
            .collect();
        lost.sort_by_key(|(j, _)| self.graph.position(j));

        self.discarding.retain(|_, f| f.worker != worker);
        self.pool.reset_load(worker);

        for (job, flight) in lost {
            self.in_flight.remove(&job);
            flight.cancel.raise();
            self.record(&job, Some(worker), flight.attempt, flight.started_at, RecordOutcome::WorkerLost);

            if self.reassigned.insert(job.clone()) {
                warn!(job = %job, worker = %worker, attempt = flight.attempt, "worker lost; requeueing job once");
                let cause = StatusCause::WorkerLost {
                    worker: worker.to_string(),
                };
                if self.transition(&job, JobStatus::Failed, Some(cause)) {
                    match self.graph.requeue(&job) {
                        Ok(()) => self.publish_status(&job, JobStatus::Failed, JobStatus::Pending, None),
                        Err(err) => error!(job = %job, error = %err, "requeue after worker loss failed"),
                    }
                }
            } else {
                let err = OrchestratorError::Dispatch(format!("worker '{worker}' became unreachable"));
                warn!(job = %job, error = %err, "job lost a worker again; applying retry policy");
                self.fail_attempt(&job, now);
            }
        }
    }

    fn enqueue_ready(&mut self, now: Instant) {
        for job in self.graph.ready_set() {
            if let Some(&until) = self.backoff_until.get(&job) {
                if until > now {
                    continue;
                }
                self.backoff_until.remove(&job);
            }
            if self.transition(&job, JobStatus::Ready, None) {
                self.queue.push(job);
            }
        }
    }

    fn assign(&mut self) -> Vec<Dispatch> {
        let mut dispatches = Vec::new();
        let mut waiting = Vec::new();

        for job in self.queue.drain() {
            if self.graph.status(&job) != Some(JobStatus::Ready) {
                continue;
            }
            if self.in_flight.len() >= self.options.max_in_flight {
                waiting.push(job);
                continue;
            }

            let Some(spec) = self.graph.get(&job).map(|j| j.spec().clone()) else {
                continue;
            };

            let payload = match self.schemas.validate_job(&spec) {
                Ok(payload) => payload,
                Err(err) => {
                    self.reject(&job, err.to_string());
                    continue;
                }
            };

            let Some(worker) = self.pool.select(&spec.requires).map(str::to_string) else {
                debug!(job = %job, requires = ?spec.requires, "no eligible worker; job stays queued");
                waiting.push(job);
                continue;
            };

            let attempt = self.next_attempt(&job);
            if !self.transition(&job, JobStatus::Running, None) {
                continue;
            }
            self.pool.acquire(&worker);

            let cancel = CancelFlag::new();
            self.in_flight.insert(
                job.clone(),
                InFlight {
                    worker: worker.clone(),
                    attempt,
                    started_at: Utc::now(),
                    cancel: cancel.clone(),
                },
            );
            self.bus.publish(EventKind::AttemptStarted {
                job: job.clone(),
                worker: worker.clone(),
                attempt,
            });
            info!(job = %job, worker = %worker, attempt, "dispatching job");

            dispatches.push(Dispatch {
                worker,
                task: Task {
                    job,
                    attempt,
                    kind: spec.task,
                    payload,
                    cancel,
                },
            });
        }

        self.queue.restore_front(waiting);
        dispatches
    }

    /// Fail a job whose payload does not satisfy its schema. Not retried.
    fn reject(&mut self, job: &str, reason: String) {
        warn!(job = %job, %reason, "payload rejected by schema; failing job");
        let attempt = self.next_attempt(job);
        let started_at = Utc::now();

        if !self.transition(job, JobStatus::Running, None) {
            return;
        }
        self.record(job, None, attempt, started_at, RecordOutcome::Rejected { reason: reason.clone() });
        if self.transition(job, JobStatus::Failed, Some(StatusCause::SchemaValidation { reason })) {
            self.cancel_dependents(job);
        }
    }

    /// `Running -> Failed`, then either an explicit retry with backoff or
    /// failure propagation to dependents.
    fn fail_attempt(&mut self, job: &str, now: Instant) {
        let Some((retries_used, limit)) = self
            .graph
            .get(job)
            .map(|j| (j.retry_count(), j.spec().max_retries))
        else {
            return;
        };

        if self.options.retry.allows_retry(retries_used, limit) {
            let retry = retries_used + 1;
            let delay = self.options.retry.backoff(retry);
            let cause = StatusCause::RetryScheduled {
                retry,
                delay_ms: delay.as_millis() as u64,
            };
            if !self.transition(job, JobStatus::Failed, Some(cause)) {
                return;
            }
            match self.graph.retry(job) {
                Ok(count) => {
                    self.backoff_until.insert(job.to_string(), now + delay);
                    self.publish_status(job, JobStatus::Failed, JobStatus::Pending, None);
                    info!(job = %job, retry = count, delay_ms = delay.as_millis() as u64, "retry scheduled");
                }
                Err(err) => error!(job = %job, error = %err, "retry transition failed"),
            }
        } else {
            let attempts = retries_used + 1;
            let err = OrchestratorError::RetryExhausted {
                job: job.to_string(),
                attempts,
            };
            warn!(job = %job, error = %err, "job failed; cancelling dependents");
            if self.transition(job, JobStatus::Failed, Some(StatusCause::RetryExhausted { attempts })) {
                self.cancel_dependents(job);
            }
        }
    }

    /// Cancel every non-terminal transitive dependent of `upstream`.
    fn cancel_dependents(&mut self, upstream: &str) -> Vec<JobId> {
        let mut cancelled = Vec::new();
        for job in self.graph.transitive_dependents(upstream) {
            let cause = StatusCause::CancellationPropagated {
                upstream: upstream.to_string(),
            };
            if self.cancel_one(&job, cause) {
                let err = OrchestratorError::CancellationPropagated {
                    job: job.clone(),
                    upstream: upstream.to_string(),
                };
                debug!(error = %err, "dependent cancelled");
                cancelled.push(job);
            }
        }
        cancelled
    }

    fn cancel_one(&mut self, job: &str, cause: StatusCause) -> bool {
        match self.graph.status(job) {
            Some(status) if !status.is_terminal() => {}
            _ => return false,
        }

        if let Some(flight) = self.in_flight.remove(job) {
            flight.cancel.raise();
            self.discarding.insert((job.to_string(), flight.attempt), flight);
        }
        self.queue.remove(job);
        self.backoff_until.remove(job);

        self.transition(job, JobStatus::Cancelled, Some(cause))
    }

    fn next_attempt(&mut self, job: &str) -> u32 {
        let n = self.attempts.entry(job.to_string()).or_insert(0);
        *n += 1;
        *n
    }

    /// Apply a status change through the graph and publish it.
    fn transition(&mut self, job: &str, to: JobStatus, cause: Option<StatusCause>) -> bool {
        match self.graph.mark_status(job, to) {
            Ok(from) => {
                debug!(job = %job, %from, %to, "status changed");
                self.publish_status(job, from, to, cause);
                true
            }
            Err(err) => {
                error!(job = %job, error = %err, "rejected status transition");
                false
            }
        }
    }

    fn publish_status(&self, job: &str, from: JobStatus, to: JobStatus, cause: Option<StatusCause>) {
        self.bus.publish(EventKind::JobStatusChanged {
            job: job.to_string(),
            from,
            to,
            cause,
        });
    }

    fn record(
        &self,
        job: &str,
        worker: Option<&str>,
        attempt: u32,
        started_at: DateTime<Utc>,
        outcome: RecordOutcome,
    ) {
        self.bus.publish(EventKind::AttemptFinished {
            record: ExecutionRecord {
                job: job.to_string(),
                worker: worker.map(str::to_string),
                attempt,
                started_at,
                finished_at: Utc::now(),
                outcome,
            },
        });
    }

    fn maybe_finish_run(&mut self) {
        if self.run_finished || !self.graph.is_complete() {
            return;
        }
        self.run_finished = true;
        let summary = self.graph.summary();
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            successful = summary.successful,
            "orchestration run complete"
        );
        self.bus.publish(EventKind::RunFinished { summary });
    }
}
