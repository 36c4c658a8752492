use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical job identity (the `[job.<name>]` key).
pub type JobId = String;

/// Canonical worker identity (the `[worker.<id>]` key).
pub type WorkerId = String;

/// Lifecycle status of a job within one orchestration run.
///
/// Allowed transitions:
/// - `Pending -> Ready -> Running -> Succeeded | Failed`
/// - `Failed -> Pending` only through an explicit retry
///   (see [`crate::dag::JobGraph::retry`])
/// - `Cancelled` from any non-terminal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// `Succeeded`, `Failed` and `Cancelled` are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether `self -> to` is a legal forward transition.
    ///
    /// The retry edge `Failed -> Pending` is deliberately not included.
    pub fn can_transition_to(self, to: JobStatus) -> bool {
        use JobStatus::*;
        match (self, to) {
            (Pending, Ready) | (Ready, Running) => true,
            (Running, Succeeded) | (Running, Failed) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Ready => "ready",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Liveness of a worker as derived from its heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerHealth {
    Healthy,
    Degraded,
    Unreachable,
}

impl fmt::Display for WorkerHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerHealth::Healthy => "healthy",
            WorkerHealth::Degraded => "degraded",
            WorkerHealth::Unreachable => "unreachable",
        };
        f.write_str(s)
    }
}

/// The closed set of task kinds a job can run.
///
/// Selected per job via `[job.<name>.task]`:
///
/// ```toml
/// [job.build.task]
/// kind = "command"
/// cmd = "make all"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TaskKind {
    /// Run a shell command; exit status 0 is success.
    Command { cmd: String },
    /// Sleep for `ms` milliseconds, then succeed.
    Sleep { ms: u64 },
    /// Succeed immediately.
    #[default]
    Noop,
}
