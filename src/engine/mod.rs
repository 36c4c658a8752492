// src/engine/mod.rs

//! Scheduler / executor core.
//!
//! This module ties together:
//! - the job graph and worker pool ([`scheduler`], [`pool`])
//! - retry accounting ([`retry`]) and the ready queue ([`queue`])
//! - the main runtime event loop that reacts to:
//!   - scheduling ticks
//!   - attempt completions from workers
//!   - worker heartbeats
//!   - cancellation and shutdown requests
//!
//! The deterministic state machine lives in [`scheduler`] and is driven by
//! [`core`]; the async/IO shell is implemented in [`runtime`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::schema::ValidatedPayload;
use crate::types::{JobId, TaskKind, WorkerId};

/// Result of one attempt as reported by a worker backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    /// The task ran and failed.
    Failed(String),
    /// The task could not be delivered to or started on the worker.
    DispatchError(String),
}

/// Cooperative cancellation flag shared between scheduler and task.
///
/// Raising it never interrupts a task; backends check it at task
/// boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a worker is asked to execute for one attempt.
#[derive(Debug, Clone)]
pub struct Task {
    pub job: JobId,
    /// 1-based attempt number for this job.
    pub attempt: u32,
    pub kind: TaskKind,
    pub payload: ValidatedPayload,
    pub cancel: CancelFlag,
}

/// A task bound to the worker it was assigned to.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub worker: WorkerId,
    pub task: Task,
}

/// Events flowing into the runtime from workers, heartbeats, signals, etc.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A dispatched attempt finished.
    AttemptFinished {
        job: JobId,
        attempt: u32,
        worker: WorkerId,
        outcome: Outcome,
    },
    /// Liveness signal from a worker.
    Heartbeat { worker: WorkerId },
    /// Cancel a job and its dependents.
    CancelJob { job: JobId },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod pool;
pub mod queue;
pub mod retry;
pub mod runtime;
pub mod scheduler;

pub use self::core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use pool::{HealthChange, Worker, WorkerPool};
pub use queue::ReadyQueue;
pub use retry::RetryPolicy;
pub use runtime::Runtime;
pub use scheduler::{Scheduler, SchedulerOptions};
