//! Request lifecycle events.
//!
//! The scheduler reports every transition of a request to an optional
//! [`EventSink`] so callers can build alerting or audit trails without
//! parsing log lines.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::PriorityRequest;
use crate::util::clock::now_ms;
use crate::util::serde::{Priority, RequestId};

/// What happened to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// Accepted by `submit`.
    Added,
    /// Handed to its handler.
    Processing,
    /// Handler succeeded.
    Completed,
    /// Attempt failed and the request went back to the queue.
    Retrying,
    /// Request terminally failed.
    Failed,
    /// Request was cancelled while pending.
    Cancelled,
    /// Pending request moved to another priority class.
    PriorityChanged,
}

/// One lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerEvent {
    /// Request the event belongs to.
    pub request_id: RequestId,
    /// Handler key of the request.
    pub request_type: String,
    /// Priority at the time of the event.
    pub priority: Priority,
    /// Event kind.
    pub action: EventAction,
    /// Attempts made so far.
    pub attempts: u32,
    /// Timestamp in milliseconds since epoch.
    pub created_at_ms: u128,
    /// Additional context (error message, old priority, ...).
    pub detail: Option<String>,
}

/// Event sink abstraction.
pub trait EventSink: Send {
    /// Record an event.
    fn record(&mut self, event: SchedulerEvent);
}

/// Bounded in-memory sink; the oldest events are dropped first.
pub struct InMemoryEventSink {
    events: VecDeque<SchedulerEvent>,
    max_events: usize,
}

impl InMemoryEventSink {
    /// Create a sink that keeps at most `max_events`.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events.min(1024)),
            max_events,
        }
    }

    /// Snapshot of stored events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<SchedulerEvent> {
        self.events.iter().cloned().collect()
    }

    /// Stored events for one request, oldest first.
    #[must_use]
    pub fn events_for(&self, request_id: &str) -> Vec<SchedulerEvent> {
        self.events
            .iter()
            .filter(|e| e.request_id == request_id)
            .cloned()
            .collect()
    }
}

impl EventSink for InMemoryEventSink {
    fn record(&mut self, event: SchedulerEvent) {
        if self.max_events == 0 {
            return;
        }
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Sink handle that stays readable after being given to a scheduler.
#[derive(Clone)]
pub struct SharedEventSink {
    inner: Arc<Mutex<InMemoryEventSink>>,
}

impl SharedEventSink {
    /// Create a shared bounded sink.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(InMemoryEventSink::new(max_events))),
        }
    }

    /// Snapshot of stored events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<SchedulerEvent> {
        self.inner.lock().events()
    }

    /// Actions recorded for one request, oldest first.
    #[must_use]
    pub fn actions_for(&self, request_id: &str) -> Vec<EventAction> {
        self.inner
            .lock()
            .events_for(request_id)
            .into_iter()
            .map(|e| e.action)
            .collect()
    }
}

impl EventSink for SharedEventSink {
    fn record(&mut self, event: SchedulerEvent) {
        self.inner.lock().record(event);
    }
}

/// Build an event from a request snapshot.
pub fn build_event(
    request: &PriorityRequest,
    action: EventAction,
    detail: Option<String>,
) -> SchedulerEvent {
    SchedulerEvent {
        request_id: request.id.clone(),
        request_type: request.request_type.clone(),
        priority: request.priority,
        action,
        attempts: request.attempts,
        created_at_ms: now_ms(),
        detail,
    }
}
