//! HTTP surface for the recipes.
//!
//! | Route | Body | Runs |
//! |-------|------|------|
//! | `POST /ask` | `{country}` or `{query}` | [`RatesAgent`] |
//! | `POST /research` | `{topic}` or `{query}` | [`ResearchWorkflow`] |
//! | `POST /chat` | `{session_id` or `user_id, message}` | [`ChatAgent`] |
//! | `GET /health` | | |
//!
//! A missing or blank field answers 400 with `{"error": "Missing 'topic' in
//! request"}`. A failed run answers 500 with `{"error": ...}`.

mod error;
mod handlers;

pub use error::ApiError;

use crate::errors::PipelineValidationError;
use crate::memory::SessionStore;
use crate::recipes::{ChatAgent, Providers, RatesAgent, RecipeSettings, ResearchWorkflow};
use crate::vectorstore::VectorStore;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    rates: Arc<RatesAgent>,
    research: Arc<ResearchWorkflow>,
    chat: Arc<ChatAgent>,
}

impl AppState {
    /// Wraps already built recipes.
    pub fn new(rates: RatesAgent, research: ResearchWorkflow, chat: ChatAgent) -> Self {
        Self {
            rates: Arc::new(rates),
            research: Arc::new(research),
            chat: Arc::new(chat),
        }
    }

    /// Builds every recipe over the given stores.
    ///
    /// `rates_store` holds ingested bank rates, `research_store` holds the
    /// reference documents used by research and chat.
    ///
    /// # Errors
    ///
    /// Returns `PipelineValidationError` if a recipe fails to build.
    pub fn build(
        rates_store: Arc<dyn VectorStore>,
        research_store: Arc<dyn VectorStore>,
        sessions: Arc<dyn SessionStore>,
        providers: &Providers,
        settings: &RecipeSettings,
    ) -> Result<Self, PipelineValidationError> {
        Ok(Self::new(
            RatesAgent::new(rates_store, providers, settings)?,
            ResearchWorkflow::new(research_store.clone(), providers, settings)?,
            ChatAgent::new(research_store, providers, sessions, settings)?,
        ))
    }
}

/// Creates the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/ask", post(handlers::ask))
        .route("/research", post(handlers::research))
        .route("/chat", post(handlers::chat))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
