//! Runtime configuration.
//!
//! Configuration is assembled from defaults, an optional JSON file, and the
//! process environment (after loading `.env` with `dotenvy`).

use crate::errors::ConfigError;
use crate::retry::RetryPolicy;
use crate::vectorstore::DistanceMetric;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Environment variable holding the OpenAI API key.
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
/// Environment variable overriding the OpenAI base URL.
pub const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
/// Environment variable holding the Tavily API key.
pub const ENV_TAVILY_API_KEY: &str = "TAVILY_API_KEY";
/// Environment variable overriding the server bind address.
pub const ENV_BIND: &str = "CASCADEFLOW_BIND";
/// Environment variable switching logs to JSON.
pub const ENV_LOG_JSON: &str = "CASCADEFLOW_LOG_JSON";

/// Settings for the OpenAI-compatible completion and embedding endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// API key.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Base URL, including the `/v1` prefix.
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    /// Chat completion model.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    /// Embedding model.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens per completion.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    600
}

fn default_timeout() -> f64 {
    30.0
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openai_base_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl OpenAiConfig {
    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the chat model.
    #[must_use]
    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    /// Returns the request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds.max(0.0))
    }
}

/// Settings for the Tavily web search API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TavilyConfig {
    /// API key.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Base URL.
    #[serde(default = "default_tavily_base_url")]
    pub base_url: String,
    /// Results requested per search.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
}

fn default_tavily_base_url() -> String {
    "https://api.tavily.com".to_string()
}

fn default_max_results() -> usize {
    5
}

impl Default for TavilyConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_tavily_base_url(),
            max_results: default_max_results(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl TavilyConfig {
    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Returns the request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds.max(0.0))
    }
}

/// Retrieval settings for the bundled recipes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Documents fetched by the rates agent.
    #[serde(default = "default_rates_top_k")]
    pub rates_top_k: usize,
    /// Documents fetched by the research workflow and chat.
    #[serde(default = "default_research_top_k")]
    pub research_top_k: usize,
    /// Similarity metric of the vector store.
    #[serde(default)]
    pub metric: DistanceMetric,
}

fn default_rates_top_k() -> usize {
    1
}

fn default_research_top_k() -> usize {
    4
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rates_top_k: default_rates_top_k(),
            research_top_k: default_research_top_k(),
            metric: DistanceMetric::default(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Emit logs as JSON lines.
    #[serde(default)]
    pub log_json: bool,
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            log_json: false,
        }
    }
}

impl ServerConfig {
    /// Parses the bind address.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the address does not parse.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
            key: "server.bind".to_string(),
            message: e.to_string(),
        })
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// Chat and embedding models.
    #[serde(default)]
    pub openai: OpenAiConfig,
    /// Web search.
    #[serde(default)]
    pub tavily: TavilyConfig,
    /// Backoff for rate-limited model calls.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Vector store query settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
}

impl CascadeConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the OpenAI settings.
    #[must_use]
    pub fn with_openai(mut self, openai: OpenAiConfig) -> Self {
        self.openai = openai;
        self
    }

    /// Sets the Tavily settings.
    #[must_use]
    pub fn with_tavily(mut self, tavily: TavilyConfig) -> Self {
        self.tavily = tavily;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the server settings.
    #[must_use]
    pub fn with_server(mut self, server: ServerConfig) -> Self {
        self.server = server;
        self
    }

    /// Loads defaults overlaid with the environment, reading `.env` first.
    #[must_use]
    pub fn from_env() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self::default().merge_env(|key| std::env::var(key).ok())
    }

    /// Loads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read and
    /// `ConfigError::Parse` if it is not valid configuration JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Overlays values from an environment lookup.
    ///
    /// Unset or blank variables leave the current value untouched.
    #[must_use]
    pub fn merge_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = var(ENV_OPENAI_API_KEY) {
            self.openai.api_key = Some(key);
        }
        if let Some(url) = var(ENV_OPENAI_BASE_URL) {
            self.openai.base_url = url;
        }
        if let Some(key) = var(ENV_TAVILY_API_KEY) {
            self.tavily.api_key = Some(key);
        }
        if let Some(bind) = var(ENV_BIND) {
            self.server.bind = bind;
        }
        if let Some(flag) = var(ENV_LOG_JSON) {
            self.server.log_json = matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        self
    }

    /// Checks that every enabled provider is usable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` for an absent API key and
    /// `ConfigError::Invalid` for out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.openai.api_key.is_none() {
            return Err(ConfigError::Missing {
                key: ENV_OPENAI_API_KEY.to_string(),
            });
        }
        if self.tavily.api_key.is_none() {
            return Err(ConfigError::Missing {
                key: ENV_TAVILY_API_KEY.to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.openai.temperature) {
            return Err(ConfigError::Invalid {
                key: "openai.temperature".to_string(),
                message: "must be between 0.0 and 2.0".to_string(),
            });
        }
        if self.tavily.max_results == 0 {
            return Err(ConfigError::Invalid {
                key: "tavily.max_results".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.retrieval.rates_top_k == 0 || self.retrieval.research_top_k == 0 {
            return Err(ConfigError::Invalid {
                key: "retrieval".to_string(),
                message: "top-k must be at least 1".to_string(),
            });
        }
        self.server.socket_addr()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = CascadeConfig::default();
        assert_eq!(config.openai.chat_model, "gpt-4o-mini");
        assert_eq!(config.openai.embedding_model, "text-embedding-3-small");
        assert!((config.openai.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.openai.max_tokens, 600);
        assert_eq!(config.tavily.max_results, 5);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retrieval.rates_top_k, 1);
        assert_eq!(config.server.bind, "127.0.0.1:5000");
        assert_eq!(config.openai.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_merge_env() {
        let config = CascadeConfig::default().merge_env(lookup(&[
            (ENV_OPENAI_API_KEY, "sk-test"),
            (ENV_TAVILY_API_KEY, "tvly-test"),
            (ENV_BIND, "0.0.0.0:8080"),
            (ENV_LOG_JSON, "true"),
            (ENV_OPENAI_BASE_URL, "   "),
        ]));

        assert_eq!(config.openai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.tavily.api_key.as_deref(), Some("tvly-test"));
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert!(config.server.log_json);
        assert_eq!(config.openai.base_url, "https://api.openai.com/v1");
        tokio_test::assert_ok!(config.validate());
    }

    #[test]
    fn test_validate_missing_keys() {
        let err = CascadeConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing { ref key } if key == ENV_OPENAI_API_KEY));

        let config = CascadeConfig::default().with_openai(OpenAiConfig::default().with_api_key("k"));
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing { ref key } if key == ENV_TAVILY_API_KEY));
    }

    #[test]
    fn test_validate_bad_bind() {
        let config = CascadeConfig::default()
            .with_openai(OpenAiConfig::default().with_api_key("k"))
            .with_tavily(TavilyConfig::default().with_api_key("t"))
            .with_server(ServerConfig {
                bind: "not an address".to_string(),
                log_json: false,
            });

        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"openai": {{"chat_model": "gpt-4o"}}, "retry": {{"max_attempts": 5}}, "retrieval": {{"metric": "euclidean"}}}}"#
        )
        .unwrap();

        let config = CascadeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.openai.chat_model, "gpt-4o");
        assert_eq!(config.openai.max_tokens, 600);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.retrieval.metric, DistanceMetric::Euclidean);
    }

    #[test]
    fn test_from_file_errors() {
        assert!(matches!(
            CascadeConfig::from_file("/definitely/not/here.json"),
            Err(ConfigError::Io(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        assert!(matches!(
            CascadeConfig::from_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_api_keys_not_serialized() {
        let config = CascadeConfig::default().with_openai(OpenAiConfig::default().with_api_key("secret"));
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
