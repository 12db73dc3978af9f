//! Web search stage.

use super::{AnswerFn, PromptTemplate, Stage};
use crate::context::Context;
use crate::core::Outcome;
use crate::errors::StageError;
use crate::providers::SearchProvider;
use crate::retry::{with_retry, RetryPolicy};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Runs a web search and writes the hits to the context.
///
/// Like [`super::RetrievalStage`], it only collects unless an answer
/// function is set.
pub struct SearchStage {
    name: String,
    provider: Arc<dyn SearchProvider>,
    query: PromptTemplate,
    max_results: usize,
    output_field: String,
    answer: Option<AnswerFn>,
    retry: RetryPolicy,
}

impl SearchStage {
    /// Creates a search stage querying `{input}` into `search_results`.
    pub fn new(name: impl Into<String>, provider: Arc<dyn SearchProvider>) -> Self {
        Self {
            name: name.into(),
            provider,
            query: PromptTemplate::new("{input}"),
            max_results: 5,
            output_field: "search_results".to_string(),
            answer: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the query template.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<PromptTemplate>) -> Self {
        self.query = query.into();
        self
    }

    /// Sets the result limit.
    #[must_use]
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Sets the field the hits are written to.
    #[must_use]
    pub fn with_output_field(mut self, field: impl Into<String>) -> Self {
        self.output_field = field.into();
        self
    }

    /// Sets the function that turns the hits into an answer.
    #[must_use]
    pub fn with_answer<F>(mut self, answer: F) -> Self
    where
        F: Fn(&mut Context) -> Result<Option<Value>, StageError> + Send + Sync + 'static,
    {
        self.answer = Some(Arc::new(answer));
        self
    }

    /// Sets the retry policy for rate-limited searches.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl fmt::Debug for SearchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchStage")
            .field("name", &self.name)
            .field("query", &self.query)
            .field("max_results", &self.max_results)
            .field("output_field", &self.output_field)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for SearchStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, ctx: &mut Context) -> Result<Outcome, StageError> {
        let query = self.query.render(ctx);
        let hits = with_retry(&self.retry, &self.name, || {
            self.provider.search(&query, self.max_results)
        })
        .await?;
        tracing::debug!(stage = %self.name, hits = hits.len(), "Web search returned");

        let count = hits.len();
        ctx.set(self.output_field.clone(), serde_json::to_value(&hits).unwrap_or_default())?;

        let Some(answer) = &self.answer else {
            return Ok(Outcome::deferred(format!("collected {count} results")));
        };
        if count == 0 {
            return Ok(Outcome::deferred("no search results"));
        }
        Ok(answer(ctx)?.map_or_else(
            || Outcome::deferred("no usable answer in search results"),
            |value| Outcome::satisfied(value).with_note(format!("answered from {count} results")),
        ))
    }
}
