//! Shared reqwest plumbing for HTTP providers.

use super::ProviderError;
use crate::errors::ConfigError;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

pub(super) fn build_client(service: &str, timeout: Duration) -> Result<Client, ConfigError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ConfigError::Invalid {
            key: service.to_string(),
            message: e.to_string(),
        })
}

pub(super) fn send_error(service: &str, err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::unreachable(service, format!("request timed out: {err}"))
    } else {
        ProviderError::unreachable(service, err.to_string())
    }
}

/// Maps non-success statuses to provider errors; 429 becomes `RateLimited`.
pub(super) async fn check_status(service: &str, response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("HTTP {}: {}", status.as_u16(), body.trim());
    if status == StatusCode::TOO_MANY_REQUESTS {
        tracing::warn!(service, "Provider rate limited the request");
        Err(ProviderError::rate_limited(service, message))
    } else {
        Err(ProviderError::provider(service, message))
    }
}
