// src/exec/local.rs

//! In-process worker backend.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::engine::{Outcome, Task};
use crate::types::TaskKind;

use super::backend::{AttemptFuture, WorkerBackend};

/// Env var prefix for individual payload fields.
pub const PARAM_ENV_PREFIX: &str = "ORCH_PARAM_";

/// Runs every worker's tasks on the local machine.
///
/// `Command` tasks run through the platform shell with the validated payload
/// exposed in the environment; `Sleep` and `Noop` are handled directly.
#[derive(Debug, Clone, Default)]
pub struct LocalBackend;

impl LocalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl WorkerBackend for LocalBackend {
    fn dispatch(&self, worker: &str, task: Task) -> AttemptFuture {
        let worker = worker.to_string();
        Box::pin(async move { run_task(&worker, task).await })
    }
}

async fn run_task(worker: &str, task: Task) -> Outcome {
    if task.cancel.is_raised() {
        debug!(job = %task.job, attempt = task.attempt, "cancelled before start; not running");
        return Outcome::Failed("cancelled before start".to_string());
    }

    match &task.kind {
        TaskKind::Noop => Outcome::Succeeded,
        TaskKind::Sleep { ms } => {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
            Outcome::Succeeded
        }
        TaskKind::Command { cmd } => match run_command(worker, &task, cmd).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(job = %task.job, attempt = task.attempt, error = %err, "could not start task process");
                Outcome::DispatchError(format!("{err:#}"))
            }
        },
    }
}

/// Spawn `cmd` and wait for it. Only spawn failures surface as `Err`.
async fn run_command(worker: &str, task: &Task, cmd: &str) -> Result<Outcome> {
    info!(job = %task.job, attempt = task.attempt, worker = %worker, cmd = %cmd, "starting task process");

    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    };

    command
        .envs(task_env(worker, task))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .with_context(|| format!("spawning process for job '{}'", task.job))?;

    if let Some(stdout) = child.stdout.take() {
        let job = task.job.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(job = %job, "stdout: {}", line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let job = task.job.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(job = %job, "stderr: {}", line);
            }
        });
    }

    let outcome = match child.wait().await {
        Ok(status) if status.success() => Outcome::Succeeded,
        Ok(status) => match status.code() {
            Some(code) => Outcome::Failed(format!("exited with code {code}")),
            None => Outcome::Failed("terminated by signal".to_string()),
        },
        Err(err) => Outcome::Failed(format!("waiting for process: {err}")),
    };

    info!(job = %task.job, attempt = task.attempt, ?outcome, "task process exited");
    Ok(outcome)
}

/// Environment handed to a `Command` task.
pub fn task_env(worker: &str, task: &Task) -> Vec<(String, String)> {
    let mut env = vec![
        ("ORCH_JOB".to_string(), task.job.clone()),
        ("ORCH_ATTEMPT".to_string(), task.attempt.to_string()),
        ("ORCH_WORKER".to_string(), worker.to_string()),
    ];

    for (key, value) in &task.payload.values {
        let rendered = match value {
            toml::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        env.push((format!("{PARAM_ENV_PREFIX}{}", key.to_uppercase()), rendered));
    }

    match serde_json::to_string(&task.payload.values) {
        Ok(json) => env.push(("ORCH_PARAMS".to_string(), json)),
        Err(err) => warn!(job = %task.job, error = %err, "payload not representable as JSON; ORCH_PARAMS unset"),
    }

    env
}
