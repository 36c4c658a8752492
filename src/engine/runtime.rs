// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::dag::RunSummary;
use crate::errors::Result;
use crate::exec::WorkerBackend;

use super::core::CoreRuntime;
use super::{CoreCommand, Dispatch, RuntimeEvent};

/// Drives the scheduler from ticks and `RuntimeEvent`s, and delegates
/// attempt execution to a `WorkerBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// scheduling semantics.
pub struct Runtime<B: WorkerBackend> {
    core: CoreRuntime,
    event_tx: mpsc::Sender<RuntimeEvent>,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    backend: Arc<B>,
    tick_interval: Duration,
}

impl<B: WorkerBackend> fmt::Debug for Runtime<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("tick_interval", &self.tick_interval)
            .finish_non_exhaustive()
    }
}

impl<B: WorkerBackend> Runtime<B> {
    /// `event_tx` must feed `event_rx`; attempt results are sent back on it.
    pub fn new(
        core: CoreRuntime,
        event_tx: mpsc::Sender<RuntimeEvent>,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        backend: Arc<B>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            core,
            event_tx,
            event_rx,
            backend,
            tick_interval,
        }
    }

    /// Sender for injecting events (heartbeats, cancellation, shutdown).
    pub fn sender(&self) -> mpsc::Sender<RuntimeEvent> {
        self.event_tx.clone()
    }

    /// Main event loop.
    ///
    /// - Runs a scheduling pass every `tick_interval`.
    /// - Feeds events from the channel into the core runtime.
    /// - Executes the commands the core returns.
    ///
    /// Returns once every job is terminal and no attempt is outstanding, or
    /// right after a shutdown request.
    pub async fn run(mut self) -> Result<RunSummary> {
        info!(tick_ms = self.tick_interval.as_millis() as u64, "orchestrator runtime started");

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let step = tokio::select! {
                _ = ticker.tick() => self.core.on_tick(Instant::now()),
                event = self.event_rx.recv() => match event {
                    Some(event) => {
                        debug!(?event, "runtime received event");
                        self.core.step(event, Instant::now())
                    }
                    None => {
                        info!("runtime event channel closed; exiting");
                        break;
                    }
                },
            };

            for command in step.commands {
                self.execute_command(command);
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        let summary = self.core.summary();
        info!(?summary, "runtime exiting");
        Ok(summary)
    }

    fn execute_command(&self, command: CoreCommand) {
        match command {
            CoreCommand::Dispatch(dispatches) => {
                for dispatch in dispatches {
                    self.spawn_attempt(dispatch);
                }
            }
            CoreCommand::RequestExit => {
                debug!("core issued RequestExit command");
            }
        }
    }

    fn spawn_attempt(&self, dispatch: Dispatch) {
        let Dispatch { worker, task } = dispatch;
        let job = task.job.clone();
        let attempt = task.attempt;
        let fut = self.backend.dispatch(&worker, task);
        let tx = self.event_tx.clone();

        tokio::spawn(async move {
            let outcome = fut.await;
            let event = RuntimeEvent::AttemptFinished {
                job,
                attempt,
                worker,
                outcome,
            };
            if tx.send(event).await.is_err() {
                debug!("runtime gone; dropping attempt result");
            }
        });
    }
}
