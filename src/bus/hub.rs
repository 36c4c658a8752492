// src/bus/hub.rs

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{trace, warn};

use crate::bus::event::{Event, EventKind, ExecutionRecord};
use crate::bus::log::RecordSink;
use crate::types::{JobId, JobStatus, WorkerId};

/// Process-wide event log with replaying subscriptions.
///
/// Every published event is appended to one in-memory log. Subscribers read
/// that log through their own cursor, starting from the beginning, so all of
/// them see the same order regardless of when they subscribed. Cloning the
/// bus yields another handle to the same log.
#[derive(Debug, Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<BusState>,
    /// Number of events in the log; bumped on every publish to wake readers.
    len_tx: watch::Sender<u64>,
}

#[derive(Debug, Default)]
struct BusState {
    events: Vec<Event>,
    records: Vec<ExecutionRecord>,
    sink: Option<RecordSink>,
    closed: bool,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (len_tx, _rx) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(BusState::default()),
                len_tx,
            }),
        }
    }

    /// Also append every execution record to `sink`.
    pub fn with_record_sink(self, sink: RecordSink) -> Self {
        self.state().sink = Some(sink);
        self
    }

    /// Append an event; returns its sequence number.
    pub fn publish(&self, kind: EventKind) -> u64 {
        let (seq, len) = {
            let mut state = self.state();
            let seq = state.events.len() as u64;

            if let EventKind::AttemptFinished { record } = &kind {
                state.records.push(record.clone());
                if let Some(sink) = state.sink.as_mut() {
                    if let Err(err) = sink.append(record) {
                        warn!(path = %sink.path().display(), error = %err, "failed to persist execution record");
                    }
                }
            }

            trace!(seq, ?kind, "event published");
            state.events.push(Event {
                seq,
                at: Utc::now(),
                kind,
            });
            (seq, state.events.len() as u64)
        };

        self.inner.len_tx.send_replace(len);
        seq
    }

    /// New subscription reading from the start of the log.
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        Subscription {
            bus: self.clone(),
            len_rx: self.inner.len_tx.subscribe(),
            cursor: 0,
            filter,
        }
    }

    /// Stop waiting subscribers once they have drained the log.
    pub fn close(&self) {
        self.state().closed = true;
        self.inner.len_tx.send_modify(|_| {});
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn len(&self) -> usize {
        self.state().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().events.is_empty()
    }

    /// Snapshot of the whole event log.
    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    /// Snapshot of the execution record log.
    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.state().records.clone()
    }

    /// Latest status of every job that has changed status, rebuilt by
    /// replaying the log.
    pub fn statuses(&self) -> HashMap<JobId, JobStatus> {
        let state = self.state();
        let mut out = HashMap::new();
        for event in &state.events {
            if let EventKind::JobStatusChanged { job, to, .. } = &event.kind {
                out.insert(job.clone(), *to);
            }
        }
        out
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Which events a subscription yields.
#[derive(Debug, Clone, Default)]
pub enum EventFilter {
    #[default]
    All,
    /// Events about any of these jobs.
    Jobs(HashSet<JobId>),
    /// Events about any of these workers.
    Workers(HashSet<WorkerId>),
    /// Run-level events only.
    Run,
}

impl EventFilter {
    pub fn job(job: impl Into<JobId>) -> Self {
        EventFilter::Jobs(HashSet::from([job.into()]))
    }

    pub fn worker(worker: impl Into<WorkerId>) -> Self {
        EventFilter::Workers(HashSet::from([worker.into()]))
    }

    pub fn matches(&self, kind: &EventKind) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Jobs(jobs) => kind.job().is_some_and(|j| jobs.contains(j)),
            EventFilter::Workers(workers) => kind.worker().is_some_and(|w| workers.contains(w)),
            EventFilter::Run => matches!(kind, EventKind::RunFinished { .. }),
        }
    }
}

/// A subscriber's cursor over the bus log.
#[derive(Debug)]
pub struct Subscription {
    bus: EventBus,
    len_rx: watch::Receiver<u64>,
    cursor: usize,
    filter: EventFilter,
}

impl Subscription {
    /// Next matching event, waiting for one to be published if needed.
    ///
    /// Returns `None` only once the bus is closed and the log is drained.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.try_next() {
                return Some(event);
            }
            if self.bus.is_closed() {
                return None;
            }
            if self.len_rx.changed().await.is_err() {
                return None;
            }
        }
    }

    /// Next matching event already in the log, without waiting.
    pub fn try_next(&mut self) -> Option<Event> {
        let state = self.bus.state();
        while self.cursor < state.events.len() {
            let event = &state.events[self.cursor];
            self.cursor += 1;
            if self.filter.matches(&event.kind) {
                return Some(event.clone());
            }
        }
        None
    }

    /// Restart from the beginning of the log.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}
