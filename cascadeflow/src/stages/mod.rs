//! Stage trait and implementations.
//!
//! A stage is one attempt at answering a request. It either satisfies the
//! request or defers to whatever comes next in the pipeline.

mod chat;
mod completion;
mod prompt;
mod retrieval;
mod search;

pub use chat::{ChatStage, NO_CONTEXT_FOUND};
pub use completion::{CompletionStage, RATE_LIMIT_APOLOGY};
pub use prompt::PromptTemplate;
pub use retrieval::RetrievalStage;
pub use search::SearchStage;

use crate::context::Context;
use crate::core::Outcome;
use crate::errors::StageError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Builds a final answer from the fields a stage just wrote.
///
/// It may write derived fields of its own. Returning `None` means the stage
/// found nothing usable and defers.
pub type AnswerFn =
    Arc<dyn Fn(&mut Context) -> Result<Option<serde_json::Value>, StageError> + Send + Sync>;

/// Trait for pipeline stages.
///
/// Stages are awaited strictly one after another. A stage may write side
/// fields into the context whether or not it satisfies the request.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Attempts to answer the request.
    ///
    /// # Errors
    ///
    /// `StageError::External` when an upstream service fails; the runner
    /// treats it as a deferral unless the stage is terminal.
    async fn attempt(&self, ctx: &mut Context) -> Result<Outcome, StageError>;

    /// Returns true if this stage must always answer.
    fn is_terminal(&self) -> bool {
        false
    }
}

/// A stage backed by a synchronous closure.
pub struct FnStage<F>
where
    F: Fn(&mut Context) -> Result<Outcome, StageError> + Send + Sync,
{
    name: String,
    func: F,
    terminal: bool,
}

impl<F> FnStage<F>
where
    F: Fn(&mut Context) -> Result<Outcome, StageError> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            terminal: false,
        }
    }

    /// Marks the stage as terminal.
    #[must_use]
    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&mut Context) -> Result<Outcome, StageError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .field("terminal", &self.terminal)
            .finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&mut Context) -> Result<Outcome, StageError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, ctx: &mut Context) -> Result<Outcome, StageError> {
        (self.func)(ctx)
    }

    fn is_terminal(&self) -> bool {
        self.terminal
    }
}

/// A terminal stage that always answers with a fixed value.
#[derive(Debug, Clone)]
pub struct StaticAnswerStage {
    name: String,
    value: serde_json::Value,
}

impl StaticAnswerStage {
    /// Creates a new static answer stage.
    pub fn new(name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[async_trait]
impl Stage for StaticAnswerStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, _ctx: &mut Context) -> Result<Outcome, StageError> {
        Ok(Outcome::satisfied(self.value.clone()).with_note("static default"))
    }

    fn is_terminal(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_stage() {
        let stage = FnStage::new("lookup", |ctx: &mut Context| {
            if ctx.has_content("query") {
                Ok(Outcome::satisfied(ctx.get("query").clone()))
            } else {
                Ok(Outcome::deferred("no query"))
            }
        });

        assert_eq!(stage.name(), "lookup");
        assert!(!stage.is_terminal());

        let mut ctx = Context::new();
        assert_eq!(stage.attempt(&mut ctx).await.unwrap(), Outcome::deferred("no query"));

        let mut ctx = Context::new().with_field("query", "hello");
        assert_eq!(stage.attempt(&mut ctx).await.unwrap().value(), Some(&json!("hello")));
    }

    #[tokio::test]
    async fn test_fn_stage_terminal_flag() {
        let stage = FnStage::new("fallback", |_: &mut Context| Ok(Outcome::satisfied("ok"))).terminal();
        assert!(stage.is_terminal());
        assert!(format!("{stage:?}").contains("fallback"));
    }

    #[tokio::test]
    async fn test_static_answer_stage() {
        let stage = StaticAnswerStage::new("default", "I don't know.");
        assert!(stage.is_terminal());

        let outcome = stage.attempt(&mut Context::new()).await.unwrap();
        assert_eq!(outcome.value(), Some(&json!("I don't know.")));
        assert_eq!(outcome.note(), Some("static default"));
    }
}
