//! Cross-type tests for the context module.

#[cfg(test)]
mod tests {
    use crate::context::{Context, RunIdentity, Trace, TraceEntry, ANSWER_KEY};
    use crate::core::{Outcome, TraceStatus};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_context_carries_session_identity() {
        let identity = RunIdentity::new().with_session_id("user-1");
        let ctx = Context::new().with_identity(identity);
        assert_eq!(ctx.identity().session_id.as_deref(), Some("user-1"));
    }

    #[test]
    fn test_answer_key_is_reserved_field() {
        let mut ctx = Context::new().with_field("query", "fd rates");
        assert!(ctx.answer().is_none());

        let outcome = Outcome::satisfied("3.5%");
        ctx.set(ANSWER_KEY, outcome.value().cloned().unwrap_or_default())
            .unwrap();

        assert_eq!(ctx.answer(), Some(&json!("3.5%")));
        assert!(ctx.set(ANSWER_KEY, "again").is_err());
    }

    #[test]
    fn test_side_fields_survive_alongside_answer() {
        let mut ctx = Context::new().with_field("query", "q");
        ctx.set("docs", json!([])).unwrap();
        ctx.set(ANSWER_KEY, "a").unwrap();

        let json = ctx.to_json();
        assert_eq!(json, json!({"query": "q", "docs": [], "answer": "a"}));
    }

    #[test]
    fn test_trace_records_outcome_status() {
        let mut trace = Trace::new();
        for (name, outcome) in [
            ("rag", Outcome::deferred("no documents")),
            ("llm", Outcome::satisfied("ok")),
        ] {
            trace.push(TraceEntry::new(name, outcome.status()).with_note(outcome.note()));
        }

        assert_eq!(trace.entries()[0].status, TraceStatus::Deferred);
        assert_eq!(trace.entries()[0].note.as_deref(), Some("no documents"));
        assert_eq!(trace.satisfied_by(), Some("llm"));
    }
}
