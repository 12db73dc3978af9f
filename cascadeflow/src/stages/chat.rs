//! Session-aware chat stage.

use super::completion::RATE_LIMIT_APOLOGY;
use super::prompt::render_item;
use super::Stage;
use crate::context::Context;
use crate::core::Outcome;
use crate::errors::StageError;
use crate::memory::{ChatMessage, SessionStore};
use crate::providers::{CompletionOptions, CompletionProvider};
use crate::retry::{with_retry, RetryPolicy};
use async_trait::async_trait;
use std::sync::Arc;

/// Context text sent when retrieval found nothing.
pub const NO_CONTEXT_FOUND: &str = "No relevant context found.";

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Use the context and chat history to answer.";

/// Answers a chat turn using the session history and retrieved context.
///
/// The prompt is the system message, then the stored history, then
/// `"{input}\n\nContext:\n{context}"`. On success both the user turn and
/// the reply are appended to the session. Without a session id the turn is
/// answered statelessly.
#[derive(Debug)]
pub struct ChatStage {
    name: String,
    provider: Arc<dyn CompletionProvider>,
    sessions: Arc<dyn SessionStore>,
    system_prompt: String,
    input_field: String,
    context_field: String,
    session_field: String,
    options: CompletionOptions,
    retry: RetryPolicy,
}

impl ChatStage {
    /// Creates a chat stage reading `input`, `docs` and `session_id`.
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn CompletionProvider>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            sessions,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            input_field: "input".to_string(),
            context_field: "docs".to_string(),
            session_field: "session_id".to_string(),
            options: CompletionOptions::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the system message.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Sets the field holding retrieved context documents.
    #[must_use]
    pub fn with_context_field(mut self, field: impl Into<String>) -> Self {
        self.context_field = field.into();
        self
    }

    /// Sets the model options.
    #[must_use]
    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the rate-limit retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn session_id(&self, ctx: &Context) -> Option<String> {
        let from_field = ctx.get_str(&self.session_field).trim();
        if from_field.is_empty() {
            ctx.identity().session_id.clone()
        } else {
            Some(from_field.to_string())
        }
    }

    fn context_text(&self, ctx: &Context) -> String {
        let docs = ctx.get_array(&self.context_field);
        if docs.is_empty() {
            return NO_CONTEXT_FOUND.to_string();
        }
        docs.iter().map(render_item).collect::<Vec<_>>().join("\n\n")
    }
}

#[async_trait]
impl Stage for ChatStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, ctx: &mut Context) -> Result<Outcome, StageError> {
        let session_id = self.session_id(ctx);
        let input = ctx.get_str(&self.input_field).to_string();

        let history = match &session_id {
            Some(id) => self.sessions.get(id).await?,
            None => Vec::new(),
        };
        let turn = format!("{input}\n\nContext:\n{}", self.context_text(ctx));

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt.as_str()));
        messages.extend(history);
        messages.push(ChatMessage::user(turn));

        let result = with_retry(&self.retry, &self.name, || {
            self.provider.chat(&messages, &self.options)
        })
        .await;

        let reply = match result {
            Ok(reply) => reply.trim().to_string(),
            Err(e) if e.is_rate_limited() => {
                tracing::warn!(stage = %self.name, error = %e, "Chat turn rate limited");
                return Ok(Outcome::satisfied(RATE_LIMIT_APOLOGY).with_note("rate limited"));
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(id) = &session_id {
            let turn = vec![ChatMessage::user(input), ChatMessage::assistant(reply.as_str())];
            self.sessions.append_turn(id, turn).await?;
            tracing::debug!(stage = %self.name, session_id = %id, "Appended chat turn");
        }

        Ok(Outcome::satisfied(reply))
    }

    fn is_terminal(&self) -> bool {
        true
    }
}
