//! Execution trace recording which stages ran and why.

use crate::core::TraceStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One step in a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Stage or node name.
    pub stage: String,
    /// How the stage ended.
    pub status: TraceStatus,
    /// Diagnostic note (deferral reason, error message, selected branch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
}

impl TraceEntry {
    /// Creates a new trace entry.
    #[must_use]
    pub fn new(stage: impl Into<String>, status: TraceStatus) -> Self {
        Self {
            stage: stage.into(),
            status,
            note: None,
            started_at: Utc::now(),
            duration_ms: 0.0,
        }
    }

    /// Sets the note.
    #[must_use]
    pub fn with_note(mut self, note: Option<impl Into<String>>) -> Self {
        self.note = note.map(Into::into);
        self
    }

    /// Sets the timing.
    #[must_use]
    pub fn with_timing(mut self, started_at: DateTime<Utc>, duration_ms: f64) -> Self {
        self.started_at = started_at;
        self.duration_ms = duration_ms;
        self
    }
}

/// Ordered record of the stages attempted during a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trace {
    entries: Vec<TraceEntry>,
}

impl Trace {
    /// Creates an empty trace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn push(&mut self, entry: TraceEntry) {
        self.entries.push(entry);
    }

    /// Returns all entries in execution order.
    #[must_use]
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stages(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.stage.as_str()).collect()
    }

    /// Returns true if the named stage was attempted.
    #[must_use]
    pub fn attempted(&self, stage: &str) -> bool {
        self.entries.iter().any(|e| e.stage == stage)
    }

    /// Returns the stage that produced the answer, if any.
    #[must_use]
    pub fn satisfied_by(&self) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.status == TraceStatus::Satisfied)
            .map(|e| e.stage.as_str())
    }

    /// Returns the last entry.
    #[must_use]
    pub fn last(&self) -> Option<&TraceEntry> {
        self.entries.last()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing ran.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total time spent in recorded stages.
    #[must_use]
    pub fn total_duration_ms(&self) -> f64 {
        self.entries.iter().map(|e| e.duration_ms).sum()
    }
}
