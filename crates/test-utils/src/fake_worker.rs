use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use orchestrator::engine::{Outcome, Task};
use orchestrator::exec::{AttemptFuture, WorkerBackend};

/// One dispatch as seen by [`ScriptedBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRecord {
    pub job: String,
    pub worker: String,
    pub attempt: u32,
}

/// A fake worker backend that:
/// - records every dispatch it receives
/// - answers each attempt with the next scripted outcome for that job,
///   or `Succeeded` once the script for the job runs out.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    scripts: Arc<Mutex<HashMap<String, VecDeque<Outcome>>>>,
    dispatched: Arc<Mutex<Vec<DispatchRecord>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for successive attempts of `job`.
    pub fn script(self, job: &str, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(job.to_string())
            .or_default()
            .extend(outcomes);
        self
    }

    /// Every dispatch so far, in order.
    pub fn dispatched(&self) -> Vec<DispatchRecord> {
        self.dispatched.lock().unwrap().clone()
    }

    /// Dispatches for one job, in order.
    pub fn dispatches_for(&self, job: &str) -> Vec<DispatchRecord> {
        self.dispatched()
            .into_iter()
            .filter(|d| d.job == job)
            .collect()
    }
}

impl WorkerBackend for ScriptedBackend {
    fn dispatch(&self, worker: &str, task: Task) -> AttemptFuture {
        self.dispatched.lock().unwrap().push(DispatchRecord {
            job: task.job.clone(),
            worker: worker.to_string(),
            attempt: task.attempt,
        });
        let outcome = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&task.job)
            .and_then(|q| q.pop_front())
            .unwrap_or(Outcome::Succeeded);

        Box::pin(async move { outcome })
    }
}
