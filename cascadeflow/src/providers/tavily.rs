//! Tavily web search client.

use super::http::{build_client, check_status, send_error};
use super::{ProviderError, SearchHit, SearchProvider};
use crate::config::TavilyConfig;
use crate::errors::ConfigError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const SERVICE: &str = "tavily";

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    search_depth: &'static str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

/// Web search over the Tavily API.
#[derive(Debug, Clone)]
pub struct TavilySearchProvider {
    client: Client,
    config: TavilyConfig,
    api_key: String,
}

impl TavilySearchProvider {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` when no API key is configured.
    pub fn new(config: TavilyConfig) -> Result<Self, ConfigError> {
        let api_key = config.api_key.clone().ok_or_else(|| ConfigError::Missing {
            key: crate::config::ENV_TAVILY_API_KEY.to_string(),
        })?;
        let client = build_client(SERVICE, config.timeout())?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }
}

#[async_trait]
impl SearchProvider for TavilySearchProvider {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ProviderError> {
        let request = SearchRequest {
            api_key: &self.api_key,
            query,
            max_results,
            search_depth: "basic",
        };

        tracing::debug!(query, max_results, "Searching the web");

        let response = self
            .client
            .post(format!("{}/search", self.config.base_url.trim_end_matches('/')))
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error(SERVICE, &e))?;

        let body: SearchResponse = check_status(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::malformed(SERVICE, e.to_string()))?;

        Ok(body.results.into_iter().take(max_results).collect())
    }
}
