// src/exec/backend.rs

//! Pluggable worker backend abstraction.
//!
//! The runtime hands each [`Dispatch`](crate::engine::Dispatch) to a
//! `WorkerBackend` instead of running tasks itself. Production uses
//! [`LocalBackend`](super::LocalBackend); tests can provide a backend that
//! returns scripted outcomes without spawning processes.

use std::future::Future;
use std::pin::Pin;

use crate::engine::{Outcome, Task};

/// Future resolving to the outcome of one attempt.
pub type AttemptFuture = Pin<Box<dyn Future<Output = Outcome> + Send + 'static>>;

/// Trait abstracting how an attempt reaches a worker.
pub trait WorkerBackend: Send + Sync + 'static {
    /// Run `task` on `worker`.
    ///
    /// The returned future must not borrow `self`; the runtime spawns it and
    /// reports the outcome back to the scheduler. Failures to reach or start
    /// the worker are reported as [`Outcome::DispatchError`].
    fn dispatch(&self, worker: &str, task: Task) -> AttemptFuture;
}
