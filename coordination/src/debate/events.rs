//! Debate events: ordered progress reporting for live observers.
//!
//! Events never feed back into control flow: the log records them in
//! emission order and forwards each one to an optional [`EventSink`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::analysis::AnalysisRecord;

/// Who produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Analyst,
    Reviewer,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Analyst => write!(f, "analyst"),
            Self::Reviewer => write!(f, "reviewer"),
            Self::System => write!(f, "system"),
        }
    }
}

/// What kind of step an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Analysis,
    Revision,
    Critique,
    Approval,
    Rejection,
    Info,
    Synthesis,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Analysis => write!(f, "analysis"),
            Self::Revision => write!(f, "revision"),
            Self::Critique => write!(f, "critique"),
            Self::Approval => write!(f, "approval"),
            Self::Rejection => write!(f, "rejection"),
            Self::Info => write!(f, "info"),
            Self::Synthesis => write!(f, "synthesis"),
        }
    }
}

/// One progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateEvent {
    pub role: Role,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl DebateEvent {
    pub fn new(role: Role, kind: EventKind, content: impl Into<String>) -> Self {
        Self {
            role,
            kind,
            content: content.into(),
            data: None,
            timestamp: Utc::now(),
        }
    }

    /// System-level informational event.
    pub fn info(content: impl Into<String>) -> Self {
        Self::new(Role::System, EventKind::Info, content)
    }

    /// Attach a record snapshot as the structured payload.
    pub fn with_record(mut self, record: &AnalysisRecord) -> Self {
        self.data = Some(record.to_value());
        self
    }

    /// Attach an arbitrary structured payload.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Consumer of debate events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &DebateEvent);
}

/// Shared reference to a sink.
pub type SharedEventSink = Arc<dyn EventSink>;

/// Adapter turning a closure into a sink.
pub struct FnSink<F>(pub F);

impl<F> EventSink for FnSink<F>
where
    F: Fn(&DebateEvent) + Send + Sync,
{
    fn emit(&self, event: &DebateEvent) {
        (self.0)(event)
    }
}

/// Sink that fans events out over a Tokio broadcast channel.
///
/// Sending with no subscribers is not an error.
pub struct BroadcastSink {
    sender: broadcast::Sender<DebateEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DebateEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: &DebateEvent) {
        let _ = self.sender.send(event.clone());
    }
}

/// Ordered event log with optional forwarding.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Vec<DebateEvent>,
    sink: Option<SharedEventSink>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(sink: Option<SharedEventSink>) -> Self {
        Self {
            events: Vec::new(),
            sink,
        }
    }

    /// Append an event and forward it to the sink.
    pub fn emit(&mut self, event: DebateEvent) {
        if let Some(sink) = &self.sink {
            sink.emit(&event);
        }
        self.events.push(event);
    }

    pub fn events(&self) -> &[DebateEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<DebateEvent> {
        self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events of a given kind.
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("events", &self.events.len())
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_log_forwards_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink: SharedEventSink = Arc::new(FnSink(move |e: &DebateEvent| {
            seen_clone.lock().unwrap().push(e.kind);
        }));

        let mut log = EventLog::with_sink(Some(sink));
        log.emit(DebateEvent::info("start"));
        log.emit(DebateEvent::new(Role::Reviewer, EventKind::Critique, "weak"));
        log.emit(DebateEvent::new(Role::Analyst, EventKind::Revision, "fixed"));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventKind::Info, EventKind::Critique, EventKind::Revision]
        );
        assert_eq!(log.len(), 3);
        assert_eq!(log.count(EventKind::Critique), 1);
    }

    #[test]
    fn test_log_without_sink() {
        let mut log = EventLog::new();
        log.emit(DebateEvent::info("x"));
        assert_eq!(log.into_events().len(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_sink() {
        let sink = BroadcastSink::new(8);
        let mut rx = sink.subscribe();
        sink.emit(&DebateEvent::info("hello"));
        let got = rx.recv().await.unwrap();
        assert_eq!(got.content, "hello");
    }

    #[test]
    fn test_event_serializes_type_field() {
        let event = DebateEvent::new(Role::Reviewer, EventKind::Approval, "ok");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["role"], "reviewer");
        assert_eq!(json["type"], "approval");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(Role::System.to_string(), "system");
        assert_eq!(EventKind::Rejection.to_string(), "rejection");
    }
}
