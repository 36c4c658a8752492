// src/exec/heartbeat.rs

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::engine::RuntimeEvent;
use crate::types::WorkerId;

/// Emit a `Heartbeat` for each of `workers` every `interval`.
///
/// The task ends when the runtime's event channel closes.
pub fn spawn_heartbeats(
    workers: Vec<WorkerId>,
    interval: Duration,
    tx: mpsc::Sender<RuntimeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            for worker in &workers {
                let event = RuntimeEvent::Heartbeat {
                    worker: worker.clone(),
                };
                if tx.send(event).await.is_err() {
                    debug!("runtime channel closed; stopping heartbeats");
                    return;
                }
            }
        }
    })
}
