// src/engine/queue.rs

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use crate::types::JobId;

/// FIFO of jobs that are `Ready` but not yet dispatched.
///
/// Semantics:
/// - Jobs are appended in the order they became ready; within one tick that
///   is job insertion order.
/// - A job is queued at most once.
/// - Jobs that could not be placed on a worker keep their position.
#[derive(Debug, Default)]
pub struct ReadyQueue {
    entries: VecDeque<JobId>,
    members: HashSet<JobId>,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `job` unless it is already queued.
    pub fn push(&mut self, job: JobId) -> bool {
        if !self.members.insert(job.clone()) {
            debug!(job = %job, "job already queued; ignoring");
            return false;
        }
        self.entries.push_back(job);
        true
    }

    /// Take every queued job, oldest first.
    pub fn drain(&mut self) -> Vec<JobId> {
        self.members.clear();
        self.entries.drain(..).collect()
    }

    /// Put back jobs that could not be dispatched, ahead of anything queued
    /// since they were drained.
    pub fn restore_front(&mut self, jobs: Vec<JobId>) {
        for job in jobs.into_iter().rev() {
            if self.members.insert(job.clone()) {
                self.entries.push_front(job);
            }
        }
    }

    pub fn remove(&mut self, job: &str) -> bool {
        if !self.members.remove(job) {
            return false;
        }
        self.entries.retain(|j| j != job);
        true
    }

    /// Snapshot of queued jobs in order.
    pub fn jobs(&self) -> Vec<JobId> {
        self.entries.iter().cloned().collect()
    }
}
