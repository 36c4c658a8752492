// src/bus/event.rs

//! Event and execution-record types published on the bus.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dag::RunSummary;
use crate::types::{JobId, JobStatus, WorkerHealth, WorkerId};

/// One entry in the bus log.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// Position in the log, starting at 0.
    pub seq: u64,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    JobStatusChanged {
        job: JobId,
        from: JobStatus,
        to: JobStatus,
        cause: Option<StatusCause>,
    },
    AttemptStarted {
        job: JobId,
        worker: WorkerId,
        attempt: u32,
    },
    AttemptFinished {
        record: ExecutionRecord,
    },
    WorkerHealthChanged {
        worker: WorkerId,
        from: WorkerHealth,
        to: WorkerHealth,
    },
    RunFinished {
        summary: RunSummary,
    },
}

impl EventKind {
    /// Job this event is about, if any.
    pub fn job(&self) -> Option<&str> {
        match self {
            EventKind::JobStatusChanged { job, .. } | EventKind::AttemptStarted { job, .. } => {
                Some(job)
            }
            EventKind::AttemptFinished { record } => Some(&record.job),
            EventKind::WorkerHealthChanged { .. } | EventKind::RunFinished { .. } => None,
        }
    }

    /// Worker this event is about, if any.
    pub fn worker(&self) -> Option<&str> {
        match self {
            EventKind::AttemptStarted { worker, .. }
            | EventKind::WorkerHealthChanged { worker, .. } => Some(worker),
            EventKind::AttemptFinished { record } => record.worker.as_deref(),
            EventKind::JobStatusChanged { .. } | EventKind::RunFinished { .. } => None,
        }
    }
}

/// Why a status change happened, when it is not the plain forward path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusCause {
    /// Attempt failed; the job will be retried after `delay_ms`.
    RetryScheduled { retry: u32, delay_ms: u64 },
    /// Attempt failed and no retries remain.
    RetryExhausted { attempts: u32 },
    /// An upstream job failed or was cancelled.
    CancellationPropagated { upstream: JobId },
    /// Cancelled on request.
    CancelRequested,
    /// Orchestrator shutting down.
    Shutdown,
    /// Payload rejected by its schema; not retried.
    SchemaValidation { reason: String },
    /// Worker became unreachable while the attempt was in flight.
    WorkerLost { worker: WorkerId },
}

/// Immutable log entry for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionRecord {
    pub job: JobId,
    /// `None` when the attempt was rejected before reaching a worker.
    pub worker: Option<WorkerId>,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: RecordOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RecordOutcome {
    Succeeded,
    Failed { reason: String },
    DispatchError { reason: String },
    /// Payload failed schema validation.
    Rejected { reason: String },
    /// Worker went unreachable mid-attempt.
    WorkerLost,
    /// Result arrived after the job was cancelled and was ignored.
    Discarded,
}
