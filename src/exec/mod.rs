// src/exec/mod.rs

//! Worker execution layer.
//!
//! - [`backend`] provides the `WorkerBackend` trait the runtime dispatches
//!   attempts through; tests replace it with a scripted implementation.
//! - [`local`] runs tasks on the local machine using
//!   `tokio::process::Command`.
//! - [`heartbeat`] emits liveness signals for in-process workers.

pub mod backend;
pub mod heartbeat;
pub mod local;

pub use backend::{AttemptFuture, WorkerBackend};
pub use heartbeat::spawn_heartbeats;
pub use local::LocalBackend;
