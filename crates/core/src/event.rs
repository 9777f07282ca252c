//! Audit events: the append-only record of every session state change.
//!
//! Each session owns an [`AuditLog`]. Copies of every event can be
//! forwarded to any number of [`EventSink`]s (a tracing backend, an
//! external audit shipper, a test collector) without those sinks being
//! part of the session's persisted state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOrigin {
    User,
    System,
    Tool,
    Assistant,
    Memory,
}

/// What kind of state change an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    ToolUse,
    Response,
    MemoryBlock,
    Lifecycle,
    Error,
}

/// A single audit entry. Never edited once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub origin: EventOrigin,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub content: Value,
    /// Always carries the session's `role`.
    pub metadata: Map<String, Value>,
}

impl Event {
    /// Content rendered as plain text (strings are unquoted).
    pub fn content_text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// Append-only event sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditLog {
    events: Vec<Event>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event, assigning the next id. Returns the stored event.
    pub fn append(
        &mut self,
        origin: EventOrigin,
        kind: EventKind,
        content: Value,
        metadata: Map<String, Value>,
    ) -> &Event {
        let event = Event {
            id: self.events.len() as u64 + 1,
            timestamp: Utc::now(),
            origin,
            kind,
            content,
            metadata,
        };
        self.events.push(event);
        &self.events[self.events.len() - 1]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// The last `limit` events; all of them when `limit` is zero.
    pub fn recent(&self, limit: usize) -> &[Event] {
        if limit == 0 || limit >= self.events.len() {
            &self.events
        } else {
            &self.events[self.events.len() - limit..]
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Event> {
        self.events.iter()
    }
}

/// Receives a copy of every appended event.
pub trait EventSink: Send + Sync {
    fn record(&self, session_key: &str, event: &Event);
}

/// Forwards events to `tracing` under the `careclaw::audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, session_key: &str, event: &Event) {
        tracing::info!(
            target: "careclaw::audit",
            session = session_key,
            event_id = event.id,
            origin = ?event.origin,
            kind = ?event.kind,
            content = %truncate(&event.content_text(), 120),
            "audit event"
        );
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
