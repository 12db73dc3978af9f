//! OpenAI-compatible chat completion and embedding clients.

use super::http::{build_client, check_status, send_error};
use super::{CompletionOptions, CompletionProvider, EmbeddingProvider, ProviderError};
use crate::config::OpenAiConfig;
use crate::errors::ConfigError;
use crate::memory::ChatMessage;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const SERVICE: &str = "openai";

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: String,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{path}", base_url.trim_end_matches('/'))
}

fn api_key(config: &OpenAiConfig) -> Result<String, ConfigError> {
    config.api_key.clone().ok_or_else(|| ConfigError::Missing {
        key: crate::config::ENV_OPENAI_API_KEY.to_string(),
    })
}

/// Chat completions over the OpenAI HTTP API.
#[derive(Debug, Clone)]
pub struct OpenAiCompletionProvider {
    client: Client,
    config: OpenAiConfig,
    api_key: String,
}

impl OpenAiCompletionProvider {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` when no API key is configured.
    pub fn new(config: OpenAiConfig) -> Result<Self, ConfigError> {
        let api_key = api_key(&config)?;
        let client = build_client(SERVICE, config.timeout())?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletionProvider {
    async fn chat(&self, messages: &[ChatMessage], options: &CompletionOptions) -> Result<String, ProviderError> {
        let model = options.model.as_deref().unwrap_or(&self.config.chat_model);
        let request = ChatRequest {
            model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.to_string(),
                    content: &m.content,
                })
                .collect(),
            temperature: options.temperature.unwrap_or(self.config.temperature),
            max_tokens: options.max_tokens.unwrap_or(self.config.max_tokens),
        };

        tracing::debug!(model, messages = messages.len(), "Requesting chat completion");

        let response = self
            .client
            .post(endpoint(&self.config.base_url, "chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error(SERVICE, &e))?;

        let body: ChatResponse = check_status(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::malformed(SERVICE, e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::malformed(SERVICE, "response has no message content"))
    }
}

/// Text embeddings over the OpenAI HTTP API.
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddingProvider {
    client: Client,
    config: OpenAiConfig,
    api_key: String,
}

impl OpenAiEmbeddingProvider {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` when no API key is configured.
    pub fn new(config: OpenAiConfig) -> Result<Self, ConfigError> {
        let api_key = api_key(&config)?;
        let client = build_client(SERVICE, config.timeout())?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let request = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: text,
        };

        let response = self
            .client
            .post(endpoint(&self.config.base_url, "embeddings"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error(SERVICE, &e))?;

        let body: EmbeddingResponse = check_status(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::malformed(SERVICE, e.to_string()))?;

        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::malformed(SERVICE, "response has no embedding"))
    }
}
