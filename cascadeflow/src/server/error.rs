//! Mapping of run failures onto HTTP responses.

use crate::errors::CascadeError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// A failed request, rendered as `{"error": message}`.
#[derive(Debug)]
pub struct ApiError(pub CascadeError);

impl ApiError {
    /// Returns the status code for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl<E: Into<CascadeError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.0.to_string();
        if status.is_server_error() {
            tracing::error!(error = %message, "Request failed");
        } else {
            tracing::debug!(error = %message, "Rejected request");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}
