//! Stage outcome and workflow route types.

use super::TraceStatus;
use serde::{Deserialize, Serialize};

/// The result of one stage attempt.
///
/// "No answer found" is a normal [`Outcome::Deferred`], never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The stage answered the request.
    Satisfied {
        /// The produced answer.
        value: serde_json::Value,
        /// Optional diagnostic note.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    /// The stage had nothing to contribute; the next stage should try.
    Deferred {
        /// Optional diagnostic note explaining the deferral.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
}

impl Outcome {
    /// Creates a satisfied outcome.
    #[must_use]
    pub fn satisfied(value: impl Into<serde_json::Value>) -> Self {
        Self::Satisfied {
            value: value.into(),
            note: None,
        }
    }

    /// Creates a deferred outcome with a note.
    #[must_use]
    pub fn deferred(note: impl Into<String>) -> Self {
        Self::Deferred {
            note: Some(note.into()),
        }
    }

    /// Creates a deferred outcome without a note.
    #[must_use]
    pub fn deferred_silently() -> Self {
        Self::Deferred { note: None }
    }

    /// Attaches or replaces the diagnostic note.
    #[must_use]
    pub fn with_note(self, note: impl Into<String>) -> Self {
        match self {
            Self::Satisfied { value, .. } => Self::Satisfied {
                value,
                note: Some(note.into()),
            },
            Self::Deferred { .. } => Self::Deferred {
                note: Some(note.into()),
            },
        }
    }

    /// Returns true if the stage answered.
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied { .. })
    }

    /// Returns the produced value, if satisfied.
    #[must_use]
    pub fn value(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Satisfied { value, .. } => Some(value),
            Self::Deferred { .. } => None,
        }
    }

    /// Returns the diagnostic note.
    #[must_use]
    pub fn note(&self) -> Option<&str> {
        match self {
            Self::Satisfied { note, .. } | Self::Deferred { note } => note.as_deref(),
        }
    }

    /// Returns the trace status for this outcome.
    #[must_use]
    pub fn status(&self) -> TraceStatus {
        match self {
            Self::Satisfied { .. } => TraceStatus::Satisfied,
            Self::Deferred { .. } => TraceStatus::Deferred,
        }
    }
}

/// The edge a workflow node asks the executor to follow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "route", content = "label", rename_all = "snake_case")]
pub enum Route {
    /// Follow the node's single fixed edge (or finish).
    Next,
    /// Follow the branch edge registered under this label.
    Branch(String),
}

impl Route {
    /// Creates a branch route.
    #[must_use]
    pub fn branch(label: impl Into<String>) -> Self {
        Self::Branch(label.into())
    }

    /// Returns the branch label, if any.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Next => None,
            Self::Branch(label) => Some(label),
        }
    }
}
