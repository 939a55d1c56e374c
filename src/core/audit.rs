//! Audit sink implementations.
//!
//! Keeps a bounded in-memory trail of orchestration milestones (task start and
//! completion, window open and close) for diagnostics and tests.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::util::clock::now_ms;

/// Audit event structure.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Task label or account id the event concerns.
    pub subject: String,
    /// Emitting component (`executor`, `admission`, `scheduler`).
    pub component: String,
    /// Action taken (start, complete, discard, window_open, window_close, ...).
    pub action: String,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context.
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// Shared handle to a sink, as held by executor and admission queue.
pub type SharedAuditSink = Arc<Mutex<Box<dyn AuditSink>>>;

/// In-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.max_events == 0 {
            return;
        }
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Sink that forwards events into a shared [`InMemoryAuditSink`] the caller keeps a handle to.
pub struct SharedMemoryAuditSink(pub Arc<Mutex<InMemoryAuditSink>>);

impl AuditSink for SharedMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        self.0.lock().record(event);
    }
}

/// Helper to build an audit event from context.
pub fn build_audit_event(
    subject: impl Into<String>,
    component: impl Into<String>,
    action: impl Into<String>,
    detail: Option<String>,
) -> AuditEvent {
    AuditEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        subject: subject.into(),
        component: component.into(),
        action: action.into(),
        created_at_ms: now_ms(),
        detail,
    }
}

/// Record into an optional shared sink.
pub(crate) fn record_to(
    sink: Option<&SharedAuditSink>,
    subject: &str,
    component: &str,
    action: &str,
    detail: Option<String>,
) {
    if let Some(sink) = sink {
        sink.lock()
            .record(build_audit_event(subject, component, action, detail));
    }
}
