// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use tokio::time::Instant;
use tracing::{info, warn};

use crate::engine::scheduler::Scheduler;
use crate::engine::{Dispatch, Outcome};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Hand these attempts to the worker backend.
    Dispatch(Vec<Dispatch>),
    /// The run is over; the shell should stop.
    RequestExit,
}

/// Decision returned by the core after handling a single event or tick.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    /// Every dispatch carried by this step, in order.
    pub fn dispatches(&self) -> impl Iterator<Item = &Dispatch> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::Dispatch(batch) => Some(batch),
                CoreCommand::RequestExit => None,
            })
            .flatten()
    }
}

/// Schedule whatever became possible and decide whether to keep running.
pub fn handle_tick(scheduler: &mut Scheduler, now: Instant) -> CoreStep {
    let dispatches = scheduler.tick(now);
    finish_step(scheduler, dispatches)
}

/// Apply an attempt result, then schedule.
pub fn handle_attempt_finished(
    scheduler: &mut Scheduler,
    job: &str,
    attempt: u32,
    worker: &str,
    outcome: Outcome,
    now: Instant,
) -> CoreStep {
    scheduler.handle_completion(job, attempt, worker, outcome, now);
    handle_tick(scheduler, now)
}

pub fn handle_heartbeat(scheduler: &mut Scheduler, worker: &str, now: Instant) -> CoreStep {
    scheduler.heartbeat(worker, now);
    handle_tick(scheduler, now)
}

/// Cancel a job and its dependents. Unknown jobs are logged and ignored.
pub fn handle_cancel(scheduler: &mut Scheduler, job: &str, now: Instant) -> CoreStep {
    if let Err(err) = scheduler.cancel(job) {
        warn!(job = %job, error = %err, "cancel request rejected");
    }
    handle_tick(scheduler, now)
}

/// Cancel everything still open and stop without waiting on workers.
pub fn handle_shutdown(scheduler: &mut Scheduler) -> CoreStep {
    scheduler.shutdown();
    CoreStep {
        commands: vec![CoreCommand::RequestExit],
        keep_running: false,
    }
}

fn finish_step(scheduler: &Scheduler, dispatches: Vec<Dispatch>) -> CoreStep {
    let mut commands = Vec::new();
    if !dispatches.is_empty() {
        commands.push(CoreCommand::Dispatch(dispatches));
    }

    let mut keep_running = true;
    if scheduler.is_finished() {
        info!("all jobs terminal and no attempts outstanding");
        keep_running = false;
        commands.push(CoreCommand::RequestExit);
    }

    CoreStep {
        commands,
        keep_running,
    }
}
