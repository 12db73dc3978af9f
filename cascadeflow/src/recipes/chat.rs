//! Retrieval-augmented chat with per-session memory.

use super::{Providers, RecipeSettings};
use crate::context::{Context, RunIdentity, Trace};
use crate::errors::{CascadeError, PipelineValidationError, ValidationError};
use crate::events::{EventSink, NoOpEventSink};
use crate::memory::SessionStore;
use crate::pipeline::{FallbackPipeline, PipelineBuilder};
use crate::stages::{ChatStage, RetrievalStage};
use crate::vectorstore::VectorStore;
use serde::Serialize;
use std::sync::Arc;

/// One chat reply.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    /// The assistant's answer.
    pub response: String,
    /// The session the turn was stored under, if any.
    pub session_id: Option<String>,
    /// Number of context documents retrieved for the turn.
    pub context_docs: usize,
    /// Identifier of the pipeline run that produced the reply.
    pub run_id: String,
    /// Stages attempted for the turn, in order.
    pub trace: Trace,
}

/// Chat agent: retrieves context, then answers with the session history.
#[derive(Debug, Clone)]
pub struct ChatAgent {
    pipeline: FallbackPipeline,
}

impl ChatAgent {
    /// Builds the agent.
    ///
    /// # Errors
    ///
    /// Returns `PipelineValidationError` if the pipeline is malformed.
    pub fn new(
        store: Arc<dyn VectorStore>,
        providers: &Providers,
        sessions: Arc<dyn SessionStore>,
        settings: &RecipeSettings,
    ) -> Result<Self, PipelineValidationError> {
        Self::with_event_sink(store, providers, sessions, settings, Arc::new(NoOpEventSink))
    }

    /// Builds the agent, sending lifecycle events to `sink`.
    ///
    /// # Errors
    ///
    /// Returns `PipelineValidationError` if the pipeline is malformed.
    pub fn with_event_sink(
        store: Arc<dyn VectorStore>,
        providers: &Providers,
        sessions: Arc<dyn SessionStore>,
        settings: &RecipeSettings,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, PipelineValidationError> {
        let pipeline = PipelineBuilder::new("chat")
            .stage(
                RetrievalStage::new("retrieve", store, providers.embedder.clone())
                    .with_top_k(settings.research_top_k)
                    .with_retry(settings.retry.clone()),
            )
            .stage(
                ChatStage::new("chat", providers.completion.clone(), sessions)
                    .with_retry(settings.retry.clone()),
            )
            .with_event_sink(sink)
            .build()?;
        Ok(Self { pipeline })
    }

    /// Returns the underlying pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &FallbackPipeline {
        &self.pipeline
    }

    /// Answers `message`, remembering the turn under `session_id` when given.
    ///
    /// # Errors
    ///
    /// `CascadeError::Validation` for a blank message, otherwise any run failure.
    pub async fn reply(&self, session_id: Option<&str>, message: &str) -> Result<ChatReply, CascadeError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ValidationError::missing("message").into());
        }
        let session_id = session_id.map(str::trim).filter(|id| !id.is_empty());

        let mut identity = RunIdentity::new();
        let mut ctx = Context::new().with_field("input", message);
        if let Some(id) = session_id {
            identity = identity.with_session_id(id);
            ctx = ctx.with_field("session_id", id);
        }

        let run = self.pipeline.run(ctx.with_identity(identity)).await?;
        Ok(ChatReply {
            response: run.answer().as_str().unwrap_or_default().to_string(),
            session_id: session_id.map(str::to_string),
            context_docs: run.context.get_array("docs").len(),
            run_id: run.context.identity().run_id.to_string(),
            trace: run.trace,
        })
    }
}
