// src/engine/pool.rs

//! Worker pool: capabilities, load and heartbeat-derived health.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::types::{WorkerHealth, WorkerId};

/// One worker endpoint as tracked by the scheduler.
#[derive(Debug, Clone)]
pub struct Worker {
    pub id: WorkerId,
    pub capabilities: BTreeSet<String>,
    pub capacity: usize,
    load: usize,
    health: WorkerHealth,
    last_heartbeat: Instant,
}

impl Worker {
    pub fn load(&self) -> usize {
        self.load
    }

    pub fn health(&self) -> WorkerHealth {
        self.health
    }

    pub fn last_heartbeat(&self) -> Instant {
        self.last_heartbeat
    }

    /// Whether this worker carries every tag in `requires`.
    pub fn can_run(&self, requires: &[String]) -> bool {
        requires.iter().all(|tag| self.capabilities.contains(tag))
    }

    fn has_capacity(&self) -> bool {
        self.load < self.capacity
    }
}

/// A health transition observed by [`WorkerPool::refresh_health`] or
/// [`WorkerPool::heartbeat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthChange {
    pub worker: WorkerId,
    pub from: WorkerHealth,
    pub to: WorkerHealth,
}

/// All workers known to the scheduler, in registration order.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: Vec<Worker>,
    degraded_after: Duration,
    timeout: Duration,
}

impl WorkerPool {
    pub fn new(degraded_after: Duration, timeout: Duration) -> Self {
        Self {
            workers: Vec::new(),
            degraded_after,
            timeout,
        }
    }

    /// Build a pool from `[worker.<id>]` sections; every worker starts healthy
    /// with its heartbeat clock at `now`.
    pub fn from_config<'a>(
        workers: impl IntoIterator<Item = (&'a String, &'a WorkerConfig)>,
        degraded_after: Duration,
        timeout: Duration,
        now: Instant,
    ) -> Self {
        let mut pool = Self::new(degraded_after, timeout);
        for (id, wc) in workers {
            pool.register(id.clone(), wc.capabilities.iter().cloned(), wc.capacity, now);
        }
        pool
    }

    /// Add a worker (or replace one with the same id).
    pub fn register(
        &mut self,
        id: impl Into<WorkerId>,
        capabilities: impl IntoIterator<Item = String>,
        capacity: usize,
        now: Instant,
    ) {
        let worker = Worker {
            id: id.into(),
            capabilities: capabilities.into_iter().collect(),
            capacity,
            load: 0,
            health: WorkerHealth::Healthy,
            last_heartbeat: now,
        };
        info!(worker = %worker.id, capacity, "worker registered");

        match self.workers.iter_mut().find(|w| w.id == worker.id) {
            Some(existing) => *existing = worker,
            None => self.workers.push(worker),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Worker> {
        self.workers.iter().find(|w| w.id == id)
    }

    pub fn workers(&self) -> impl Iterator<Item = &Worker> {
        self.workers.iter()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Record a heartbeat. Returns the health change if the worker was not
    /// healthy before.
    pub fn heartbeat(&mut self, id: &str, now: Instant) -> Option<HealthChange> {
        let Some(worker) = self.get_mut(id) else {
            warn!(worker = %id, "heartbeat from unknown worker; ignoring");
            return None;
        };
        worker.last_heartbeat = now;

        if worker.health == WorkerHealth::Healthy {
            return None;
        }

        let from = worker.health;
        worker.health = WorkerHealth::Healthy;
        info!(worker = %id, %from, "worker healthy again");
        Some(HealthChange {
            worker: id.to_string(),
            from,
            to: WorkerHealth::Healthy,
        })
    }

    /// Re-derive every worker's health from heartbeat age.
    ///
    /// A heartbeat is the only way back to `Healthy`, so this only ever
    /// degrades workers.
    pub fn refresh_health(&mut self, now: Instant) -> Vec<HealthChange> {
        let mut changes = Vec::new();

        for worker in self.workers.iter_mut() {
            let silent_for = now.saturating_duration_since(worker.last_heartbeat);
            let derived = if silent_for > self.timeout {
                WorkerHealth::Unreachable
            } else if silent_for > self.degraded_after {
                WorkerHealth::Degraded
            } else {
                WorkerHealth::Healthy
            };

            if rank(derived) > rank(worker.health) {
                warn!(
                    worker = %worker.id,
                    from = %worker.health,
                    to = %derived,
                    silent_ms = silent_for.as_millis() as u64,
                    "worker missed heartbeats"
                );
                changes.push(HealthChange {
                    worker: worker.id.clone(),
                    from: worker.health,
                    to: derived,
                });
                worker.health = derived;
            }
        }

        changes
    }

    /// Pick a worker for a job requiring `requires`.
    ///
    /// Eligible: not unreachable, carries every required tag, spare capacity.
    /// Preference: healthy over degraded, then least load, then registration
    /// order.
    pub fn select(&self, requires: &[String]) -> Option<&str> {
        self.workers
            .iter()
            .enumerate()
            .filter(|(_, w)| {
                w.health != WorkerHealth::Unreachable && w.has_capacity() && w.can_run(requires)
            })
            .min_by_key(|(i, w)| (rank(w.health), w.load, *i))
            .map(|(_, w)| w.id.as_str())
    }

    pub fn acquire(&mut self, id: &str) {
        if let Some(worker) = self.get_mut(id) {
            worker.load += 1;
            debug!(worker = %id, load = worker.load, "worker slot acquired");
        }
    }

    pub fn release(&mut self, id: &str) {
        if let Some(worker) = self.get_mut(id) {
            worker.load = worker.load.saturating_sub(1);
            debug!(worker = %id, load = worker.load, "worker slot released");
        }
    }

    /// Forget all load on a worker (its attempts were written off).
    pub fn reset_load(&mut self, id: &str) {
        if let Some(worker) = self.get_mut(id) {
            worker.load = 0;
        }
    }

    /// Set a worker's load directly.
    pub fn set_load(&mut self, id: &str, load: usize) {
        if let Some(worker) = self.get_mut(id) {
            worker.load = load;
        }
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Worker> {
        self.workers.iter_mut().find(|w| w.id == id)
    }
}

fn rank(health: WorkerHealth) -> u8 {
    match health {
        WorkerHealth::Healthy => 0,
        WorkerHealth::Degraded => 1,
        WorkerHealth::Unreachable => 2,
    }
}
