//! Fallback pipeline execution.

use crate::context::{Context, Trace, TraceEntry, ANSWER_KEY};
use crate::core::{Outcome, TraceStatus};
use crate::errors::{CascadeError, StageError};
use crate::events::{
    EventSink, PIPELINE_COMPLETED, PIPELINE_FAILED, PIPELINE_STARTED, STAGE_DEFERRED, STAGE_ERROR,
    STAGE_SATISFIED,
};
use crate::observability::{has_failures, pipeline_payload, stage_payload, SpanTimer};
use crate::stages::Stage;
use std::sync::Arc;
use tracing::Instrument;

/// The result of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// The final context, including side fields written by deferring stages.
    pub context: Context,
    /// Every stage attempted, in order.
    pub trace: Trace,
}

impl PipelineRun {
    /// Returns the final answer.
    #[must_use]
    pub fn answer(&self) -> &serde_json::Value {
        self.context.get(ANSWER_KEY)
    }

    /// Returns the name of the stage that answered.
    #[must_use]
    pub fn satisfied_by(&self) -> Option<&str> {
        self.trace.satisfied_by()
    }

    /// Summarizes the run as JSON: answer, answering stage, run id and trace.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "answer": self.answer(),
            "satisfied_by": self.satisfied_by(),
            "run_id": self.context.identity().run_id.to_string(),
            "trace": self.trace,
        })
    }
}

/// An ordered chain of stages where the first to answer wins.
///
/// Built with [`super::PipelineBuilder`]. Cheap to clone and safe to share
/// across concurrent runs.
#[derive(Debug, Clone)]
pub struct FallbackPipeline {
    name: String,
    stages: Arc<[Arc<dyn Stage>]>,
    event_sink: Arc<dyn EventSink>,
}

enum Step {
    Answered,
    HandedOver,
}

impl FallbackPipeline {
    pub(crate) fn new(name: String, stages: Vec<Arc<dyn Stage>>, event_sink: Arc<dyn EventSink>) -> Self {
        Self {
            name,
            stages: stages.into(),
            event_sink,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the pipeline has no stages. Never true once built.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs the stages in order until one answers.
    ///
    /// A deferring stage hands over to the next one, as does a non-terminal
    /// stage whose upstream service fails. The answer is written under
    /// [`ANSWER_KEY`].
    ///
    /// # Errors
    ///
    /// `CascadeError::TerminalStage` if a terminal stage defers or fails, and
    /// `CascadeError::DataConflict` if a stage writes a field twice.
    pub async fn run(&self, ctx: Context) -> Result<PipelineRun, CascadeError> {
        let span = tracing::info_span!(
            "pipeline",
            pipeline = %self.name,
            run_id = %ctx.identity().run_id,
        );
        self.execute(ctx).instrument(span).await
    }

    async fn execute(&self, mut ctx: Context) -> Result<PipelineRun, CascadeError> {
        let mut trace = Trace::new();
        self.event_sink
            .emit(
                PIPELINE_STARTED,
                Some(serde_json::json!({
                    "pipeline": self.name,
                    "run_id": ctx.identity().run_id.to_string(),
                    "stages": self.stage_names(),
                })),
            )
            .await;
        tracing::debug!(stages = self.stages.len(), "Pipeline started");

        for stage in self.stages.iter() {
            match self.attempt_stage(stage.as_ref(), &mut ctx, &mut trace).await {
                Ok(Step::Answered) => {
                    self.event_sink
                        .emit(
                            PIPELINE_COMPLETED,
                            Some(pipeline_payload(&self.name, ctx.identity(), &trace, None)),
                        )
                        .await;
                    tracing::info!(
                        satisfied_by = stage.name(),
                        attempted = trace.len(),
                        degraded = has_failures(&trace),
                        duration_ms = trace.total_duration_ms(),
                        "Pipeline completed"
                    );
                    return Ok(PipelineRun { context: ctx, trace });
                }
                Ok(Step::HandedOver) => {}
                Err(e) => return Err(self.fail(&ctx, &trace, e).await),
            }
        }

        // Unreachable for a validated pipeline: the last stage is terminal.
        let last = self.stages.last().map_or("", |s| s.name());
        let err = CascadeError::terminal(last, "no stage produced an answer");
        Err(self.fail(&ctx, &trace, err).await)
    }

    async fn attempt_stage(
        &self,
        stage: &dyn Stage,
        ctx: &mut Context,
        trace: &mut Trace,
    ) -> Result<Step, CascadeError> {
        let timer = SpanTimer::start(stage.name());
        let result = stage.attempt(ctx).await;
        let (started_at, duration_ms) = timer.finish();
        let name = stage.name();

        let (entry, step, event) = match result {
            Ok(Outcome::Satisfied { value, note }) => {
                ctx.set(ANSWER_KEY, value)?;
                tracing::info!(stage = name, duration_ms, "Stage satisfied request");
                let entry = TraceEntry::new(name, TraceStatus::Satisfied).with_note(note);
                (entry, Ok(Step::Answered), STAGE_SATISFIED)
            }
            Ok(Outcome::Deferred { note }) => {
                tracing::debug!(stage = name, duration_ms, note = ?note, "Stage deferred");
                let step = if stage.is_terminal() {
                    let reason = note.clone().unwrap_or_else(|| "terminal stage deferred".to_string());
                    Err(CascadeError::terminal(name, reason))
                } else {
                    Ok(Step::HandedOver)
                };
                let entry = TraceEntry::new(name, TraceStatus::Deferred).with_note(note);
                (entry, step, STAGE_DEFERRED)
            }
            Err(StageError::External(e)) => {
                let step = if stage.is_terminal() {
                    tracing::error!(stage = name, error = %e, "Terminal stage failed");
                    Err(CascadeError::terminal(name, e.to_string()))
                } else {
                    tracing::warn!(stage = name, error = %e, "Stage failed, handing over to next stage");
                    Ok(Step::HandedOver)
                };
                let entry = TraceEntry::new(name, TraceStatus::Failed).with_note(Some(e.to_string()));
                (entry, step, STAGE_ERROR)
            }
            Err(StageError::DataConflict(e)) => {
                tracing::error!(stage = name, error = %e, "Stage wrote a field twice");
                let entry = TraceEntry::new(name, TraceStatus::Failed).with_note(Some(e.to_string()));
                (entry, Err(CascadeError::DataConflict(e)), STAGE_ERROR)
            }
        };

        let entry = entry.with_timing(started_at, duration_ms);
        self.event_sink
            .emit(event, Some(stage_payload(&self.name, ctx.identity(), &entry)))
            .await;
        trace.push(entry);
        step
    }

    async fn fail(&self, ctx: &Context, trace: &Trace, err: CascadeError) -> CascadeError {
        let message = err.to_string();
        tracing::error!(error = %message, stages = ?trace.stages(), "Pipeline failed");
        self.event_sink
            .emit(
                PIPELINE_FAILED,
                Some(pipeline_payload(&self.name, ctx.identity(), trace, Some(&message))),
            )
            .await;
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExternalServiceError;
    use crate::events::CollectingEventSink;
    use crate::pipeline::PipelineBuilder;
    use crate::stages::{FnStage, StaticAnswerStage};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_first_stage_answers() {
        let pipeline = PipelineBuilder::new("p")
            .stage(FnStage::new("rag", |_: &mut Context| Ok(Outcome::satisfied("from rag"))))
            .stage(StaticAnswerStage::new("default", "from default"))
            .build()
            .unwrap();

        let run = pipeline.run(Context::new()).await.unwrap();
        assert_eq!(run.answer(), &json!("from rag"));
        assert_eq!(run.satisfied_by(), Some("rag"));
        assert_eq!(run.trace.stages(), vec!["rag"]);
        assert_eq!(run.to_json()["satisfied_by"], "rag");
        assert_eq!(run.to_json()["trace"][0]["status"], "satisfied");
    }

    #[tokio::test]
    async fn test_side_fields_survive_deferral() {
        let pipeline = PipelineBuilder::new("p")
            .stage(FnStage::new("rag", |ctx: &mut Context| {
                ctx.set("rag_docs", json!([]))?;
                Ok(Outcome::deferred("no documents"))
            }))
            .stage(StaticAnswerStage::new("default", "fallback"))
            .build()
            .unwrap();

        let run = pipeline.run(Context::new()).await.unwrap();
        assert_eq!(run.context.get("rag_docs"), &json!([]));
        assert_eq!(run.trace.entries()[0].note.as_deref(), Some("no documents"));
        assert_eq!(run.trace.entries()[0].status, TraceStatus::Deferred);
    }

    #[tokio::test]
    async fn test_terminal_deferral_fails_run() {
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline = PipelineBuilder::new("p")
            .stage(FnStage::new("llm", |_: &mut Context| Ok(Outcome::deferred("empty"))).terminal())
            .with_event_sink(sink.clone())
            .build()
            .unwrap();

        let err = pipeline.run(Context::new()).await.unwrap_err();
        assert!(matches!(err, CascadeError::TerminalStage { ref stage, ref reason } if stage == "llm" && reason == "empty"));
        assert_eq!(sink.event_types().last().map(String::as_str), Some(PIPELINE_FAILED));
    }

    #[tokio::test]
    async fn test_preset_answer_field_conflicts() {
        let pipeline = PipelineBuilder::new("p")
            .stage(StaticAnswerStage::new("default", "x"))
            .build()
            .unwrap();

        let err = pipeline
            .run(Context::new().with_field(ANSWER_KEY, "stale"))
            .await
            .unwrap_err();
        assert!(matches!(err, CascadeError::DataConflict(_)));
    }

    #[tokio::test]
    async fn test_non_terminal_error_is_recorded_as_failed() {
        let pipeline = PipelineBuilder::new("p")
            .stage(FnStage::new("web", |_: &mut Context| {
                Err(ExternalServiceError::unreachable("tavily", "dns").into())
            }))
            .stage(StaticAnswerStage::new("default", "fallback"))
            .build()
            .unwrap();

        let run = pipeline.run(Context::new()).await.unwrap();
        assert_eq!(run.trace.entries()[0].status, TraceStatus::Failed);
        assert_eq!(run.trace.entries()[0].note.as_deref(), Some("tavily unreachable: dns"));
        assert_eq!(run.satisfied_by(), Some("default"));
    }
}
