//! Trace status enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a stage or workflow node ended, as recorded in a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    /// The stage produced the final answer.
    Satisfied,
    /// The stage had no answer and handed over to the next stage.
    Deferred,
    /// The stage's upstream service failed; the runner treated it as a deferral.
    Failed,
    /// A workflow node ran to completion.
    Completed,
}

impl fmt::Display for TraceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Satisfied => write!(f, "satisfied"),
            Self::Deferred => write!(f, "deferred"),
            Self::Failed => write!(f, "failed"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl TraceStatus {
    /// Returns true if the status ends a fallback pipeline.
    #[must_use]
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Satisfied)
    }

    /// Returns true if the runner moved on to the next stage.
    #[must_use]
    pub fn handed_over(&self) -> bool {
        matches!(self, Self::Deferred | Self::Failed)
    }
}
