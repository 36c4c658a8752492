// src/config/validate.rs

use std::collections::BTreeSet;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{OrchestratorError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = OrchestratorError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

/// Run all semantic checks on a raw config.
///
/// Longer cycles are left to the job graph, which reports their path.
pub fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_jobs_and_workers(cfg)?;
    validate_orchestrator_section(cfg)?;
    validate_retry_section(cfg)?;
    validate_workers_section(cfg)?;
    validate_job_dependencies(cfg)?;
    validate_job_requirements(cfg)?;
    Ok(())
}

fn config_err(msg: impl Into<String>) -> OrchestratorError {
    OrchestratorError::Config(msg.into())
}

fn ensure_has_jobs_and_workers(cfg: &RawConfigFile) -> Result<()> {
    if cfg.job.is_empty() {
        return Err(config_err(
            "config must contain at least one [job.<name>] section",
        ));
    }
    if cfg.worker.is_empty() {
        return Err(config_err(
            "config must contain at least one [worker.<id>] section",
        ));
    }
    Ok(())
}

fn validate_orchestrator_section(cfg: &RawConfigFile) -> Result<()> {
    let o = &cfg.orchestrator;
    if o.tick_interval_ms == 0 {
        return Err(config_err("[orchestrator].tick_interval_ms must be >= 1 (got 0)"));
    }
    if o.max_in_flight == 0 {
        return Err(config_err("[orchestrator].max_in_flight must be >= 1 (got 0)"));
    }
    Ok(())
}

fn validate_retry_section(cfg: &RawConfigFile) -> Result<()> {
    let r = &cfg.retry;
    if !(r.multiplier.is_finite() && r.multiplier >= 1.0) {
        return Err(config_err(format!(
            "[retry].multiplier must be a finite number >= 1.0 (got {})",
            r.multiplier
        )));
    }
    if r.max_backoff_ms < r.base_backoff_ms {
        return Err(config_err(format!(
            "[retry].max_backoff_ms ({}) must be >= base_backoff_ms ({})",
            r.max_backoff_ms, r.base_backoff_ms
        )));
    }
    Ok(())
}

fn validate_workers_section(cfg: &RawConfigFile) -> Result<()> {
    let w = &cfg.workers;
    if w.heartbeat_interval_ms == 0 {
        return Err(config_err("[workers].heartbeat_interval_ms must be >= 1 (got 0)"));
    }
    if w.heartbeat_timeout_ms <= w.heartbeat_interval_ms {
        return Err(config_err(format!(
            "[workers].heartbeat_timeout_ms ({}) must be greater than heartbeat_interval_ms ({})",
            w.heartbeat_timeout_ms, w.heartbeat_interval_ms
        )));
    }
    let degraded = w.effective_degraded_after_ms();
    if degraded >= w.heartbeat_timeout_ms {
        return Err(config_err(format!(
            "[workers].degraded_after_ms ({degraded}) must be less than heartbeat_timeout_ms ({})",
            w.heartbeat_timeout_ms
        )));
    }
    // A worker would flip to degraded between every pair of heartbeats.
    if degraded <= w.heartbeat_interval_ms {
        return Err(config_err(format!(
            "[workers].degraded_after_ms ({degraded}, half the timeout unless set) must be greater than heartbeat_interval_ms ({})",
            w.heartbeat_interval_ms
        )));
    }

    for (id, worker) in cfg.worker.iter() {
        if worker.capacity == 0 {
            return Err(config_err(format!(
                "[worker.{id}].capacity must be >= 1 (got 0)"
            )));
        }
    }
    Ok(())
}

fn validate_job_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, job) in cfg.job.iter() {
        for dep in &job.after {
            if dep == name {
                return Err(config_err(format!("job '{name}' cannot depend on itself")));
            }
            if !cfg.job.contains_key(dep) {
                return Err(config_err(format!(
                    "job '{name}' depends on unknown job '{dep}'"
                )));
            }
        }
    }
    Ok(())
}

/// Every job must be runnable on at least one configured worker.
fn validate_job_requirements(cfg: &RawConfigFile) -> Result<()> {
    for (name, job) in cfg.job.iter() {
        let required: BTreeSet<&str> = job.requires.iter().map(|s| s.as_str()).collect();
        let satisfiable = cfg.worker.values().any(|w| {
            let caps: BTreeSet<&str> = w.capabilities.iter().map(|s| s.as_str()).collect();
            required.is_subset(&caps)
        });
        if !satisfiable {
            return Err(config_err(format!(
                "job '{name}' requires {:?} but no worker provides all of them",
                job.requires
            )));
        }
    }
    Ok(())
}
