// src/bus/mod.rs

//! State & event bus.
//!
//! - [`event`] defines events, status causes and execution records.
//! - [`hub`] is the append-only event log with per-subscriber cursors.
//! - [`log`] persists execution records as JSON lines.

pub mod event;
pub mod hub;
pub mod log;

pub use event::{Event, EventKind, ExecutionRecord, RecordOutcome, StatusCause};
pub use hub::{EventBus, EventFilter, Subscription};
pub use log::RecordSink;
