// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and scheduling ticks and produces:
//! - an updated scheduler state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels and driving the tick interval
//! - handing `Dispatch`es to the worker backend
//! - handling Ctrl+C / shutdown
//!
//! The core takes the current instant as an argument and never reads a
//! clock, so it can be stepped in tests without channels or processes.

use tokio::time::Instant;

use crate::dag::RunSummary;
use crate::engine::event_handlers::{
    CoreStep, handle_attempt_finished, handle_cancel, handle_heartbeat, handle_shutdown,
    handle_tick,
};
use crate::engine::scheduler::Scheduler;
use crate::engine::RuntimeEvent;

/// Pure core runtime state.
///
/// Owns the scheduler; has no channels and performs no IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    pub fn summary(&self) -> RunSummary {
        self.scheduler.summary()
    }

    /// Run a scheduling pass with no external event.
    pub fn on_tick(&mut self, now: Instant) -> CoreStep {
        handle_tick(&mut self.scheduler, now)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent, now: Instant) -> CoreStep {
        match event {
            RuntimeEvent::AttemptFinished {
                job,
                attempt,
                worker,
                outcome,
            } => handle_attempt_finished(&mut self.scheduler, &job, attempt, &worker, outcome, now),
            RuntimeEvent::Heartbeat { worker } => {
                handle_heartbeat(&mut self.scheduler, &worker, now)
            }
            RuntimeEvent::CancelJob { job } => handle_cancel(&mut self.scheduler, &job, now),
            RuntimeEvent::ShutdownRequested => handle_shutdown(&mut self.scheduler),
        }
    }
}
