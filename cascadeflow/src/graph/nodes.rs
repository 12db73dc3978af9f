//! Node implementations.

use super::Node;
use crate::context::Context;
use crate::core::{Outcome, Route};
use crate::errors::StageError;
use crate::providers::{CompletionOptions, CompletionProvider};
use crate::retry::{with_retry, RetryPolicy};
use crate::stages::{PromptTemplate, Stage, RATE_LIMIT_APOLOGY};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Branch label taken when a wrapped stage answers.
pub const SATISFIED_LABEL: &str = "satisfied";

/// Branch label taken when a wrapped stage defers.
pub const DEFERRED_LABEL: &str = "deferred";

/// A node backed by a synchronous closure.
pub struct FnNode<F>
where
    F: Fn(&mut Context) -> Result<Route, StageError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnNode<F>
where
    F: Fn(&mut Context) -> Result<Route, StageError> + Send + Sync,
{
    /// Creates a new function-based node.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> fmt::Debug for FnNode<F>
where
    F: Fn(&mut Context) -> Result<Route, StageError> + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnNode").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Node for FnNode<F>
where
    F: Fn(&mut Context) -> Result<Route, StageError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &mut Context) -> Result<Route, StageError> {
        (self.func)(ctx)
    }
}

/// Runs a pipeline stage as a workflow node.
///
/// With [`StageNode::branching`] the node routes to [`SATISFIED_LABEL`] or
/// [`DEFERRED_LABEL`]; otherwise it always follows its fixed edge. A
/// satisfied value is written to the output field when one is set.
#[derive(Debug)]
pub struct StageNode {
    stage: Arc<dyn Stage>,
    branching: bool,
    absorb_errors: bool,
    output_field: Option<String>,
}

impl StageNode {
    /// Wraps a stage.
    pub fn new(stage: impl Stage + 'static) -> Self {
        Self::shared(Arc::new(stage))
    }

    /// Wraps a shared stage.
    pub fn shared(stage: Arc<dyn Stage>) -> Self {
        Self {
            stage,
            branching: false,
            absorb_errors: false,
            output_field: None,
        }
    }

    /// Routes on the stage outcome.
    #[must_use]
    pub fn branching(mut self) -> Self {
        self.branching = true;
        self
    }

    /// Treats upstream service failures as a deferral.
    #[must_use]
    pub fn absorb_errors(mut self) -> Self {
        self.absorb_errors = true;
        self
    }

    /// Writes a satisfied value to this field.
    #[must_use]
    pub fn with_output_field(mut self, field: impl Into<String>) -> Self {
        self.output_field = Some(field.into());
        self
    }

    fn route(&self, label: &str) -> Route {
        if self.branching {
            Route::branch(label)
        } else {
            Route::Next
        }
    }
}

#[async_trait]
impl Node for StageNode {
    fn name(&self) -> &str {
        self.stage.name()
    }

    async fn run(&self, ctx: &mut Context) -> Result<Route, StageError> {
        match self.stage.attempt(ctx).await {
            Ok(Outcome::Satisfied { value, .. }) => {
                if let Some(field) = &self.output_field {
                    ctx.set(field.clone(), value)?;
                }
                Ok(self.route(SATISFIED_LABEL))
            }
            Ok(Outcome::Deferred { .. }) => Ok(self.route(DEFERRED_LABEL)),
            Err(StageError::External(e)) if self.absorb_errors => {
                tracing::warn!(node = self.name(), error = %e, "Node failed, continuing as deferred");
                Ok(self.route(DEFERRED_LABEL))
            }
            Err(e) => Err(e),
        }
    }
}

/// Renders a prompt, asks the model, and writes the reply to a field.
///
/// Rate-limit errors are retried; once retries run out the field receives
/// [`RATE_LIMIT_APOLOGY`]. With [`PromptNode::absorb_errors`] any other
/// upstream failure writes an empty string instead of aborting.
pub struct PromptNode {
    name: String,
    provider: Arc<dyn CompletionProvider>,
    prompt: PromptTemplate,
    output_field: String,
    options: CompletionOptions,
    retry: RetryPolicy,
    absorb_errors: bool,
}

impl PromptNode {
    /// Creates a prompt node writing to `output_field`.
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn CompletionProvider>,
        prompt: impl Into<PromptTemplate>,
        output_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            prompt: prompt.into(),
            output_field: output_field.into(),
            options: CompletionOptions::default(),
            retry: RetryPolicy::default(),
            absorb_errors: false,
        }
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

    /// Writes an empty reply instead of failing on upstream errors.
    #[must_use]
    pub fn absorb_errors(mut self) -> Self {
        self.absorb_errors = true;
        self
    }

    /// Returns the field the reply is written to.
    #[must_use]
    pub fn output_field(&self) -> &str {
        &self.output_field
    }
}

impl fmt::Debug for PromptNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptNode")
            .field("name", &self.name)
            .field("prompt", &self.prompt)
            .field("output_field", &self.output_field)
            .field("absorb_errors", &self.absorb_errors)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Node for PromptNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &mut Context) -> Result<Route, StageError> {
        let prompt = self.prompt.render(ctx);
        let result = with_retry(&self.retry, &self.name, || {
            self.provider.complete(&prompt, &self.options)
        })
        .await;

        let reply = match result {
            Ok(text) => text.trim().to_string(),
            Err(e) if e.is_rate_limited() => {
                tracing::warn!(node = %self.name, error = %e, "Writing apology after rate limiting");
                RATE_LIMIT_APOLOGY.to_string()
            }
            Err(e) if self.absorb_errors => {
                tracing::warn!(node = %self.name, error = %e, "Model call failed, writing empty reply");
                String::new()
            }
            Err(e) => return Err(e.into()),
        };

        ctx.set(self.output_field.clone(), reply)?;
        Ok(Route::Next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExternalServiceError;
    use crate::stages::StaticAnswerStage;
    use crate::testing::{MockStage, ScriptedCompletion};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_node_routes() {
        let node = FnNode::new("pick", |ctx: &mut Context| {
            Ok(if ctx.has_content("docs") {
                Route::branch("found")
            } else {
                Route::Next
            })
        });

        assert_eq!(node.run(&mut Context::new()).await.unwrap(), Route::Next);
        let mut ctx = Context::new().with_field("docs", json!(["a"]));
        assert_eq!(node.run(&mut ctx).await.unwrap(), Route::branch("found"));
    }

    #[tokio::test]
    async fn test_stage_node_branches_on_outcome() {
        let answered = StageNode::new(StaticAnswerStage::new("s", "v"))
            .branching()
            .with_output_field("value");
        let mut ctx = Context::new();
        assert_eq!(answered.run(&mut ctx).await.unwrap(), Route::branch(SATISFIED_LABEL));
        assert_eq!(ctx.get("value"), &json!("v"));

        let deferred = StageNode::new(MockStage::new("m")).branching();
        assert_eq!(
            deferred.run(&mut Context::new()).await.unwrap(),
            Route::branch(DEFERRED_LABEL)
        );

        let linear = StageNode::new(MockStage::new("m"));
        assert_eq!(linear.run(&mut Context::new()).await.unwrap(), Route::Next);
    }

    #[tokio::test]
    async fn test_stage_node_error_handling() {
        let failing = || MockStage::failing("web", ExternalServiceError::unreachable("tavily", "dns"));

        let strict = StageNode::new(failing());
        assert!(strict.run(&mut Context::new()).await.is_err());

        let lenient = StageNode::new(failing()).branching().absorb_errors();
        assert_eq!(
            lenient.run(&mut Context::new()).await.unwrap(),
            Route::branch(DEFERRED_LABEL)
        );
    }

    #[tokio::test]
    async fn test_prompt_node_writes_reply() {
        let provider = Arc::new(ScriptedCompletion::new("  1. Survey\n"));
        let node = PromptNode::new(
            "plan",
            provider.clone(),
            "Given the research topic '{topic}', outline research steps.",
            "plan",
        );

        let mut ctx = Context::new().with_field("topic", "graph databases");
        assert_eq!(node.run(&mut ctx).await.unwrap(), Route::Next);
        assert_eq!(ctx.get_str("plan"), "1. Survey");
        assert_eq!(
            provider.prompts(),
            vec!["Given the research topic 'graph databases', outline research steps."]
        );
    }

    #[tokio::test]
    async fn test_prompt_node_absorbs_provider_errors() {
        let provider = Arc::new(
            ScriptedCompletion::new("unused").then_fail(ExternalServiceError::provider("openai", "HTTP 500")),
        );
        let node = PromptNode::new("gaps", provider, "{docs}", "gaps").absorb_errors();

        let mut ctx = Context::new();
        node.run(&mut ctx).await.unwrap();
        assert_eq!(ctx.get("gaps"), &json!(""));
    }

    #[tokio::test]
    async fn test_prompt_node_strict_errors_propagate() {
        let provider = Arc::new(
            ScriptedCompletion::new("unused").then_fail(ExternalServiceError::malformed("openai", "no choices")),
        );
        let node = PromptNode::new("code", provider, "{solution}", "code");
        let err = node.run(&mut Context::new()).await.unwrap_err();
        assert!(matches!(err, StageError::External(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prompt_node_apologizes_after_rate_limits() {
        let provider = Arc::new(
            ScriptedCompletion::new("unused")
                .then_fail(ExternalServiceError::rate_limited("openai", "HTTP 429"))
                .then_fail(ExternalServiceError::rate_limited("openai", "HTTP 429")),
        );
        let node = PromptNode::new("plan", provider.clone(), "{topic}", "plan")
            .with_retry(RetryPolicy::new().with_max_attempts(2));

        let mut ctx = Context::new();
        node.run(&mut ctx).await.unwrap();
        assert_eq!(ctx.get_str("plan"), RATE_LIMIT_APOLOGY);
        assert_eq!(provider.call_count(), 2);
    }
}
