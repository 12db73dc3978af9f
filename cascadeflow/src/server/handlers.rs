//! Request handlers.

use super::{ApiError, AppState};
use crate::recipes::{ChatReply, RatesAnswer};
use axum::extract::{FromRequest, Request, State};
use axum::Json;
use serde_json::{json, Map, Value};
use std::convert::Infallible;

/// A request body read as a JSON object.
///
/// Bodies that are not JSON objects (wrong or missing `Content-Type`,
/// malformed JSON, arrays, scalars) read as an empty object, so the
/// recipes report the missing field as a validation error.
#[derive(Debug, Default)]
pub(super) struct RequestBody(Map<String, Value>);

impl RequestBody {
    /// Returns the first of `keys` holding a string, or "" if none does.
    fn text(&self, keys: &[&str]) -> &str {
        keys.iter()
            .find_map(|key| self.0.get(*key).and_then(Value::as_str))
            .unwrap_or_default()
    }

    fn optional_text(&self, keys: &[&str]) -> Option<&str> {
        Some(self.text(keys)).filter(|text| !text.trim().is_empty())
    }
}

impl<S: Send + Sync> FromRequest<S> for RequestBody {
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<Value>::from_request(req, state).await {
            Ok(Json(Value::Object(fields))) => Ok(Self(fields)),
            Ok(Json(other)) => {
                tracing::debug!(body = %other, "Request body is not a JSON object");
                Ok(Self::default())
            }
            Err(rejection) => {
                tracing::debug!(error = %rejection, "Unreadable request body");
                Ok(Self::default())
            }
        }
    }
}

pub(super) async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub(super) async fn ask(
    State(state): State<AppState>,
    body: RequestBody,
) -> Result<Json<RatesAnswer>, ApiError> {
    Ok(Json(state.rates.ask(body.text(&["country", "query"])).await?))
}

pub(super) async fn research(
    State(state): State<AppState>,
    body: RequestBody,
) -> Result<Json<Value>, ApiError> {
    let report = state.research.research(body.text(&["topic", "query"])).await?;
    Ok(Json(json!({
        "topic": report.topic,
        "answer": report.output,
        "used_fallback": report.used_fallback,
        "run_id": report.run_id,
        "trace": report.trace,
    })))
}

pub(super) async fn chat(
    State(state): State<AppState>,
    body: RequestBody,
) -> Result<Json<ChatReply>, ApiError> {
    let session_id = body.optional_text(&["session_id", "user_id"]);
    Ok(Json(state.chat.reply(session_id, body.text(&["message"])).await?))
}
