// src/dag/mod.rs

//! Job graph model.
//!
//! - [`job`] holds job specs, per-run job state and the run summary.
//! - [`graph`] holds the validated DAG and owns the status state machine.

pub mod graph;
pub mod job;

pub use graph::JobGraph;
pub use job::{Job, JobSpec, RunSummary};
