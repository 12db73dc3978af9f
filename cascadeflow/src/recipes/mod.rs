//! Ready-made pipelines and workflows.
//!
//! - [`RatesAgent`]: bank rates from a vector store, then web search, then
//!   the model
//! - [`research_workflow`]: plan, retrieve, analyse gaps, propose, write code
//! - [`ChatAgent`]: retrieval-augmented chat with per-session memory
//!
//! [`ingest_documents`] and [`ingest_bank_rates`] seed the stores they read.

mod chat;
mod documents;
mod rates;
mod research;

pub use chat::{ChatAgent, ChatReply};
pub use documents::{
    ingest_documents, load_text_documents, Document, TextSplitter, DEFAULT_CHUNK_OVERLAP,
    DEFAULT_CHUNK_SIZE,
};
pub use rates::{
    format_final_answer, format_rag_results, ingest_bank_rates, parse_search_rates, BankQuote,
    BankRate, RateTable, RatesAgent, RatesAnswer, RATES_HEADER,
};
pub use research::{research_workflow, ResearchReport, ResearchWorkflow};

use crate::config::CascadeConfig;
use crate::providers::{CompletionProvider, EmbeddingProvider, SearchProvider};
use std::sync::Arc;

/// The hosted services a recipe talks to.
#[derive(Debug, Clone)]
pub struct Providers {
    /// Chat completion model.
    pub completion: Arc<dyn CompletionProvider>,
    /// Text embedding model.
    pub embedder: Arc<dyn EmbeddingProvider>,
    /// Web search.
    pub search: Arc<dyn SearchProvider>,
}

impl Providers {
    /// Bundles the given providers.
    pub fn new(
        completion: Arc<dyn CompletionProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        search: Arc<dyn SearchProvider>,
    ) -> Self {
        Self {
            completion,
            embedder,
            search,
        }
    }

    /// Creates the OpenAI and Tavily clients described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an API key is missing or a client cannot be built.
    #[cfg(feature = "http-providers")]
    pub fn from_config(config: &CascadeConfig) -> Result<Self, crate::errors::ConfigError> {
        use crate::providers::{OpenAiCompletionProvider, OpenAiEmbeddingProvider, TavilySearchProvider};

        Ok(Self {
            completion: Arc::new(OpenAiCompletionProvider::new(config.openai.clone())?),
            embedder: Arc::new(OpenAiEmbeddingProvider::new(config.openai.clone())?),
            search: Arc::new(TavilySearchProvider::new(config.tavily.clone())?),
        })
    }
}

/// Tuning shared by the recipes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeSettings {
    /// Documents fetched by the rates agent.
    pub rates_top_k: usize,
    /// Documents fetched by the research workflow and chat.
    pub research_top_k: usize,
    /// Web search results per query.
    pub max_results: usize,
    /// Backoff for rate-limited model calls.
    pub retry: crate::retry::RetryPolicy,
}

impl Default for RecipeSettings {
    fn default() -> Self {
        Self::from(&CascadeConfig::default())
    }
}

impl From<&CascadeConfig> for RecipeSettings {
    fn from(config: &CascadeConfig) -> Self {
        Self {
            rates_top_k: config.retrieval.rates_top_k,
            research_top_k: config.retrieval.research_top_k,
            max_results: config.tavily.max_results,
            retry: config.retry.clone(),
        }
    }
}
