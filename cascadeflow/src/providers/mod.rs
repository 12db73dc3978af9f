//! Narrow interfaces to hosted model and search services.
//!
//! Stages depend only on these traits, so a backend can be swapped for an
//! offline implementation (such as [`HashingEmbedder`]) or a mock in tests.

mod hashing;
#[cfg(feature = "http-providers")]
mod http;
#[cfg(feature = "http-providers")]
mod openai;
#[cfg(feature = "http-providers")]
mod tavily;

pub use hashing::HashingEmbedder;
#[cfg(feature = "http-providers")]
pub use openai::{OpenAiCompletionProvider, OpenAiEmbeddingProvider};
#[cfg(feature = "http-providers")]
pub use tavily::TavilySearchProvider;

use crate::errors::ExternalServiceError;
use crate::memory::ChatMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Errors returned by providers.
pub type ProviderError = ExternalServiceError;

/// Per-call overrides for a completion request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Model name; the provider's configured model when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Upper bound on generated tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl CompletionOptions {
    /// Creates empty options; provider defaults apply.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the token limit.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A chat-completion model.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionProvider: Send + Sync + Debug {
    /// Answers a conversation.
    async fn chat(&self, messages: &[ChatMessage], options: &CompletionOptions) -> Result<String, ProviderError>;

    /// Answers a single prompt.
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String, ProviderError> {
        self.chat(&[ChatMessage::user(prompt)], options).await
    }
}

/// A text embedding model.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + Debug {
    /// Embeds one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// One web search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Page title.
    #[serde(default)]
    pub title: String,
    /// Page URL.
    #[serde(default)]
    pub url: String,
    /// Extracted text snippet.
    #[serde(default)]
    pub content: String,
    /// Relevance score, when the engine reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl SearchHit {
    /// Creates a hit with only content.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            title: String::new(),
            url: String::new(),
            content: content.into(),
            score: None,
        }
    }
}

/// A web search engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchProvider: Send + Sync + Debug {
    /// Returns up to `max_results` hits for a query.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ProviderError>;
}
