//! Context management for pipeline execution.
//!
//! This module provides:
//! - The ordered, write-once field bag threaded through a run
//! - The trace of stages attempted during a run
//! - Run identity for correlating logs and events

#[cfg(test)]
mod context_tests;
mod fields;
mod identity;
mod trace;

pub use fields::{Context, ANSWER_KEY};
pub use identity::RunIdentity;
pub use trace::{Trace, TraceEntry};
