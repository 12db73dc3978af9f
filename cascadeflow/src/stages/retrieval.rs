//! Vector store retrieval stage.

use super::{AnswerFn, PromptTemplate, Stage};
use crate::context::Context;
use crate::core::Outcome;
use crate::errors::{ExternalServiceError, StageError};
use crate::providers::EmbeddingProvider;
use crate::retry::{with_retry, RetryPolicy};
use crate::vectorstore::{MetadataFilter, ScoredRecord, VectorStore};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

/// Embeds a query, searches a vector store, and writes the hits to the context.
///
/// Hits are written as `{id, document, metadata, score}` objects. With an
/// answer function the stage satisfies when that function finds an answer
/// in the hits; without one it only collects and always defers.
pub struct RetrievalStage {
    name: String,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    query: PromptTemplate,
    top_k: usize,
    filter: Option<MetadataFilter>,
    contains_field: Option<String>,
    output_field: String,
    answer: Option<AnswerFn>,
    retry: RetryPolicy,
}

impl RetrievalStage {
    /// Creates a retrieval stage querying `{input}` for 4 hits into `docs`.
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            embedder,
            query: PromptTemplate::new("{input}"),
            top_k: 4,
            filter: None,
            contains_field: None,
            output_field: "docs".to_string(),
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

    /// Sets how many hits to fetch.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Sets a fixed metadata filter.
    #[must_use]
    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Restricts hits to documents containing the text of a context field.
    #[must_use]
    pub fn with_document_contains_field(mut self, field: impl Into<String>) -> Self {
        self.contains_field = Some(field.into());
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

    /// Sets the retry policy for rate-limited embedding and store calls.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the field the hits are written to.
    #[must_use]
    pub fn output_field(&self) -> &str {
        &self.output_field
    }

    fn effective_filter(&self, ctx: &Context) -> Option<MetadataFilter> {
        let contains = self
            .contains_field
            .as_deref()
            .map(|field| ctx.get_str(field).trim())
            .filter(|text| !text.is_empty())
            .map(MetadataFilter::contains);

        match (self.filter.clone(), contains) {
            (Some(fixed), Some(contains)) => Some(MetadataFilter::And(vec![fixed, contains])),
            (fixed, contains) => fixed.or(contains),
        }
    }
}

impl fmt::Debug for RetrievalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrievalStage")
            .field("name", &self.name)
            .field("query", &self.query)
            .field("top_k", &self.top_k)
            .field("filter", &self.filter)
            .field("output_field", &self.output_field)
            .field("collect_only", &self.answer.is_none())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

fn hit_to_json(hit: &ScoredRecord) -> Value {
    json!({
        "id": hit.record.id,
        "document": hit.record.document,
        "metadata": hit.record.metadata,
        "score": hit.score,
    })
}

#[async_trait]
impl Stage for RetrievalStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, ctx: &mut Context) -> Result<Outcome, StageError> {
        let query = self.query.render(ctx);
        let filter = self.effective_filter(ctx);

        let vector = with_retry(&self.retry, &self.name, || self.embedder.embed(&query)).await?;
        let hits = with_retry(&self.retry, &self.name, || {
            let (vector, filter) = (&vector, filter.as_ref());
            async move {
                self.store
                    .query(vector, self.top_k, filter)
                    .await
                    .map_err(ExternalServiceError::from)
            }
        })
        .await?;
        tracing::debug!(stage = %self.name, hits = hits.len(), "Retrieved documents");

        let docs: Vec<Value> = hits.iter().map(hit_to_json).collect();
        let count = docs.len();
        ctx.set(self.output_field.clone(), Value::Array(docs))?;

        let Some(answer) = &self.answer else {
            return Ok(Outcome::deferred(format!("collected {count} documents")));
        };
        if count == 0 {
            return Ok(Outcome::deferred("no documents"));
        }
        Ok(answer(ctx)?.map_or_else(
            || Outcome::deferred("no usable answer in documents"),
            |value| Outcome::satisfied(value).with_note(format!("answered from {count} documents")),
        ))
    }
}
