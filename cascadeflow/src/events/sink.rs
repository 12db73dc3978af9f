//! Event sinks.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt::Debug;
use tracing::{debug, info, Level};

/// Receives pipeline and workflow lifecycle events.
///
/// Sinks must not fail the run: delivery problems are the sink's own concern.
#[async_trait]
pub trait EventSink: Send + Sync + Debug {
    /// Delivers one event.
    async fn emit(&self, event_type: &str, data: Option<Value>);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<Value>) {}
}

/// Writes events to `tracing`, lifting the run and stage names into fields.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a sink logging at the given level. DEBUG and TRACE log at DEBUG.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        let data = data.unwrap_or(Value::Null);
        let field = |key: &str| data[key].as_str().unwrap_or_default().to_string();
        let (pipeline, run_id, stage, status) =
            (field("pipeline"), field("run_id"), field("stage"), field("status"));

        if self.level > Level::INFO {
            debug!(event_type, %pipeline, %run_id, %stage, %status, event_data = %data, "Event: {event_type}");
        } else {
            info!(event_type, %pipeline, %run_id, %stage, %status, event_data = %data, "Event: {event_type}");
        }
    }
}

/// Records events in memory, for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<(String, Option<Value>)>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<(String, Option<Value>)> {
        self.events.read().clone()
    }

    /// Returns the collected event types in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.read().iter().map(|(t, _)| t.clone()).collect()
    }

    /// Returns events whose type starts with a prefix.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<(String, Option<Value>)> {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| t.starts_with(type_prefix))
            .cloned()
            .collect()
    }

    /// Returns the payloads of events naming `stage`.
    #[must_use]
    pub fn stage_events(&self, stage: &str) -> Vec<(String, Value)> {
        self.events
            .read()
            .iter()
            .filter_map(|(t, data)| match data {
                Some(data) if data["stage"] == stage => Some((t.clone(), data.clone())),
                _ => None,
            })
            .collect()
    }

    /// Returns the number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Drops all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.events.write().push((event_type.to_string(), data));
    }
}
