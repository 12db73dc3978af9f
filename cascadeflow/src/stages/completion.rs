//! Terminal model-completion stage.

use super::{PromptTemplate, Stage};
use crate::context::Context;
use crate::core::Outcome;
use crate::errors::StageError;
use crate::memory::ChatMessage;
use crate::providers::{CompletionOptions, CompletionProvider};
use crate::retry::{with_retry, RetryPolicy};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

type Formatter = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Answer given when the model stays rate limited after every retry.
pub const RATE_LIMIT_APOLOGY: &str = "Sorry, I'm unable to process your request at the moment.";

/// Asks a completion model to answer from a prompt template.
///
/// This is the usual last stage of a fallback pipeline. Rate-limit errors
/// are retried with backoff; once retries run out the stage still answers,
/// with [`RATE_LIMIT_APOLOGY`]. Any other provider error is returned.
pub struct CompletionStage {
    name: String,
    provider: Arc<dyn CompletionProvider>,
    system_prompt: Option<String>,
    prompt: PromptTemplate,
    options: CompletionOptions,
    retry: RetryPolicy,
    output_field: Option<String>,
    formatter: Option<Formatter>,
}

impl CompletionStage {
    /// Creates a completion stage prompting with `{input}`.
    pub fn new(name: impl Into<String>, provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            name: name.into(),
            provider,
            system_prompt: None,
            prompt: PromptTemplate::new("{input}"),
            options: CompletionOptions::default(),
            retry: RetryPolicy::default(),
            output_field: None,
            formatter: None,
        }
    }

    /// Sets the system message.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Sets the user prompt template.
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<PromptTemplate>) -> Self {
        self.prompt = prompt.into();
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

    /// Also writes the model text to this context field.
    #[must_use]
    pub fn with_output_field(mut self, field: impl Into<String>) -> Self {
        self.output_field = Some(field.into());
        self
    }

    /// Shapes the model text into the final answer.
    ///
    /// The output field still receives the raw model text, and the
    /// rate-limit apology is never formatted.
    #[must_use]
    pub fn with_formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.formatter = Some(Arc::new(formatter));
        self
    }

    fn messages(&self, ctx: &Context) -> Vec<ChatMessage> {
        self.system_prompt
            .iter()
            .map(ChatMessage::system)
            .chain(std::iter::once(ChatMessage::user(self.prompt.render(ctx))))
            .collect()
    }
}

impl fmt::Debug for CompletionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionStage")
            .field("name", &self.name)
            .field("provider", &self.provider)
            .field("prompt", &self.prompt)
            .field("options", &self.options)
            .field("retry", &self.retry)
            .field("output_field", &self.output_field)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for CompletionStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, ctx: &mut Context) -> Result<Outcome, StageError> {
        let messages = self.messages(ctx);
        let result = with_retry(&self.retry, &self.name, || {
            self.provider.chat(&messages, &self.options)
        })
        .await;

        let text = match result {
            Ok(text) => text.trim().to_string(),
            Err(e) if e.is_rate_limited() => {
                tracing::warn!(stage = %self.name, error = %e, "Answering with apology after rate limiting");
                if let Some(field) = &self.output_field {
                    ctx.set(field.clone(), RATE_LIMIT_APOLOGY)?;
                }
                return Ok(Outcome::satisfied(RATE_LIMIT_APOLOGY).with_note("rate limited"));
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(field) = &self.output_field {
            ctx.set(field.clone(), text.as_str())?;
        }

        let answer = match &self.formatter {
            Some(format) => format(&text),
            None => text,
        };
        Ok(Outcome::satisfied(answer))
    }

    fn is_terminal(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExternalServiceError;
    use crate::memory::Role;
    use crate::providers::MockCompletionProvider;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_completion_answers_and_writes_field() {
        let mut provider = MockCompletionProvider::new();
        provider
            .expect_chat()
            .withf(|messages, options| {
                messages.len() == 2
                    && messages[0].role == Role::System
                    && messages[1].content == "rates for India"
                    && options.max_tokens == Some(600)
            })
            .times(1)
            .returning(|_, _| Ok("  SBI: 6.8%\n".to_string()));

        let stage = CompletionStage::new("llm", Arc::new(provider))
            .with_system_prompt("Answer clearly.")
            .with_prompt("rates for {country}")
            .with_options(CompletionOptions::new().with_max_tokens(600))
            .with_output_field("llm_fallback");

        let mut ctx = Context::new().with_field("country", "India");
        let outcome = stage.attempt(&mut ctx).await.unwrap();

        assert!(stage.is_terminal());
        assert_eq!(outcome.value(), Some(&json!("SBI: 6.8%")));
        assert_eq!(ctx.get_str("llm_fallback"), "SBI: 6.8%");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhaustion_answers_with_apology() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut provider = MockCompletionProvider::new();
        provider.expect_chat().returning(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ExternalServiceError::rate_limited("openai", "HTTP 429"))
        });

        let stage = CompletionStage::new("llm", Arc::new(provider));
        let outcome = stage.attempt(&mut Context::new()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.value(), Some(&json!(RATE_LIMIT_APOLOGY)));
        assert_eq!(outcome.note(), Some("rate limited"));
    }

    #[tokio::test]
    async fn test_formatter_shapes_answer_but_not_field() {
        let mut provider = MockCompletionProvider::new();
        provider.expect_chat().returning(|_, _| Ok("raw".to_string()));

        let stage = CompletionStage::new("llm", Arc::new(provider))
            .with_output_field("llm_text")
            .with_formatter(|text| format!("Header:\n\n{text}"));

        let mut ctx = Context::new();
        let outcome = stage.attempt(&mut ctx).await.unwrap();
        assert_eq!(outcome.value(), Some(&json!("Header:\n\nraw")));
        assert_eq!(ctx.get_str("llm_text"), "raw");
    }

    #[tokio::test]
    async fn test_provider_error_is_not_retried() {
        let mut provider = MockCompletionProvider::new();
        provider
            .expect_chat()
            .times(1)
            .returning(|_, _| Err(ExternalServiceError::provider("openai", "HTTP 500: boom")));

        let stage = CompletionStage::new("llm", Arc::new(provider));
        let err = stage.attempt(&mut Context::new()).await.unwrap_err();
        assert!(matches!(err, StageError::External(e) if e.message == "HTTP 500: boom"));
    }
}
