//! Test assertions for outcomes and traces.

use crate::context::Trace;
use crate::core::{Outcome, TraceStatus};

/// Asserts that the outcome answered the request.
pub fn assert_satisfied(outcome: &Outcome) {
    assert!(outcome.is_satisfied(), "Expected satisfied, got: {outcome:?}");
}

/// Asserts that the outcome deferred.
pub fn assert_deferred(outcome: &Outcome) {
    assert!(!outcome.is_satisfied(), "Expected deferred, got: {outcome:?}");
}

/// Asserts that the outcome answered with `expected`.
pub fn assert_answer(outcome: &Outcome, expected: &serde_json::Value) {
    assert_eq!(
        outcome.value(),
        Some(expected),
        "Expected answer {expected:?}, got {outcome:?}"
    );
}

/// Asserts the exact order of stages attempted.
pub fn assert_trace_stages(trace: &Trace, expected: &[&str]) {
    assert_eq!(trace.stages(), expected, "Unexpected stage order in trace");
}

/// Asserts the status recorded for one stage.
pub fn assert_stage_status(trace: &Trace, stage: &str, expected: TraceStatus) {
    let entry = trace
        .entries()
        .iter()
        .find(|e| e.stage == stage)
        .unwrap_or_else(|| panic!("Stage '{stage}' not in trace: {:?}", trace.stages()));
    assert_eq!(
        entry.status, expected,
        "Expected '{stage}' to be {expected}, got {}",
        entry.status
    );
}

/// Asserts that exactly one stage satisfied the run, and that it was last.
pub fn assert_single_answer(trace: &Trace) {
    let satisfied: Vec<_> = trace
        .entries()
        .iter()
        .filter(|e| e.status == TraceStatus::Satisfied)
        .collect();
    assert_eq!(satisfied.len(), 1, "Expected exactly one satisfied stage: {trace:?}");
    assert_eq!(
        trace.last().map(|e| e.status),
        Some(TraceStatus::Satisfied),
        "The satisfying stage must be the last one attempted"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TraceEntry;
    use serde_json::json;

    #[test]
    fn test_outcome_assertions() {
        let outcome = Outcome::satisfied("yes");
        assert_satisfied(&outcome);
        assert_answer(&outcome, &json!("yes"));
        assert_deferred(&Outcome::deferred("no"));
    }

    #[test]
    fn test_trace_assertions() {
        let mut trace = Trace::new();
        trace.push(TraceEntry::new("rag", TraceStatus::Deferred));
        trace.push(TraceEntry::new("llm", TraceStatus::Satisfied));

        assert_trace_stages(&trace, &["rag", "llm"]);
        assert_stage_status(&trace, "rag", TraceStatus::Deferred);
        assert_single_answer(&trace);
    }

    #[test]
    #[should_panic(expected = "Expected satisfied")]
    fn test_assert_satisfied_fails_on_deferred() {
        assert_satisfied(&Outcome::deferred_silently());
    }
}
