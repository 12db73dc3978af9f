//! Event payloads carrying the full context of a stage or run.

use crate::context::{RunIdentity, Trace, TraceEntry};
use crate::core::TraceStatus;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Builds the payload for a stage or node event.
#[must_use]
pub fn stage_payload(pipeline: &str, identity: &RunIdentity, entry: &TraceEntry) -> Value {
    let mut payload = json!({
        "pipeline": pipeline,
        "run_id": identity.run_id.to_string(),
        "stage": entry.stage,
        "status": entry.status,
        "started_at": entry.started_at.to_rfc3339(),
        "duration_ms": entry.duration_ms,
    });

    if let Some(note) = &entry.note {
        payload["note"] = json!(note);
    }
    if let Some(session_id) = &identity.session_id {
        payload["session_id"] = json!(session_id);
    }
    if let Some(request_id) = &identity.request_id {
        payload["request_id"] = json!(request_id);
    }

    payload
}

/// Builds the payload for a run-level event.
///
/// `error` is set when the run failed.
#[must_use]
pub fn pipeline_payload(
    pipeline: &str,
    identity: &RunIdentity,
    trace: &Trace,
    error: Option<&str>,
) -> Value {
    let mut status_counts: BTreeMap<String, u32> = BTreeMap::new();
    for entry in trace.entries() {
        *status_counts.entry(entry.status.to_string()).or_insert(0) += 1;
    }

    let mut payload = json!({
        "pipeline": pipeline,
        "run_id": identity.run_id.to_string(),
        "status": if error.is_some() { "failed" } else { "completed" },
        "stages": trace.stages(),
        "status_counts": status_counts,
        "duration_ms": trace.total_duration_ms(),
    });

    if let Some(stage) = trace.satisfied_by() {
        payload["satisfied_by"] = json!(stage);
    }
    if let Some(error) = error {
        payload["error"] = json!(error);
    }

    payload
}

/// Returns true if any trace entry recorded an upstream failure.
#[must_use]
pub fn has_failures(trace: &Trace) -> bool {
    trace.entries().iter().any(|e| e.status == TraceStatus::Failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace() -> Trace {
        let mut trace = Trace::new();
        trace.push(TraceEntry::new("rag", TraceStatus::Deferred).with_note(Some("no documents")));
        trace.push(TraceEntry::new("web", TraceStatus::Failed).with_note(Some("tavily unreachable")));
        trace.push(TraceEntry::new("llm", TraceStatus::Satisfied));
        trace
    }

    #[test]
    fn test_stage_payload() {
        let identity = RunIdentity::new().with_session_id("s1");
        let entry = TraceEntry::new("rag", TraceStatus::Deferred)
            .with_note(Some("no documents"))
            .with_timing(chrono::Utc::now(), 12.5);

        let payload = stage_payload("rates", &identity, &entry);
        assert_eq!(payload["stage"], "rag");
        assert_eq!(payload["status"], "deferred");
        assert_eq!(payload["note"], "no documents");
        assert_eq!(payload["duration_ms"], 12.5);
        assert_eq!(payload["session_id"], "s1");
        assert!(payload.get("request_id").is_none());
    }

    #[test]
    fn test_pipeline_payload_completed() {
        let payload = pipeline_payload("rates", &RunIdentity::new(), &trace(), None);
        assert_eq!(payload["status"], "completed");
        assert_eq!(payload["satisfied_by"], "llm");
        assert_eq!(payload["stages"], json!(["rag", "web", "llm"]));
        assert_eq!(payload["status_counts"]["failed"], 1);
    }

    #[test]
    fn test_pipeline_payload_failed() {
        let payload = pipeline_payload("rates", &RunIdentity::new(), &Trace::new(), Some("boom"));
        assert_eq!(payload["status"], "failed");
        assert_eq!(payload["error"], "boom");
        assert!(payload.get("satisfied_by").is_none());
    }

    #[test]
    fn test_has_failures() {
        assert!(has_failures(&trace()));
        assert!(!has_failures(&Trace::new()));
    }
}
