//! HTTP server for the cascadeflow recipes.
//!
//! Usage: `cascadeflow-server [config.json]`
//!
//! Without a path the configuration comes from defaults and the environment
//! (`.env` is read first). Set `CASCADEFLOW_RATES_FILE` to a JSON array of
//! bank rates to seed the rates store at startup, and `CASCADEFLOW_DOCS_DIR`
//! to a directory of `.txt` files to seed the research and chat store.

use anyhow::Context as _;
use cascadeflow::config::CascadeConfig;
use cascadeflow::memory::InMemorySessionStore;
use cascadeflow::observability::init_tracing;
use cascadeflow::recipes::{
    ingest_bank_rates, ingest_documents, load_text_documents, BankRate, Document, Providers,
    RecipeSettings, TextSplitter,
};
use cascadeflow::server::{router, AppState};
use cascadeflow::vectorstore::InMemoryVectorStore;
use std::sync::Arc;

const ENV_RATES_FILE: &str = "CASCADEFLOW_RATES_FILE";
const ENV_DOCS_DIR: &str = "CASCADEFLOW_DOCS_DIR";

fn load_config() -> anyhow::Result<CascadeConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let _ = dotenvy::dotenv();
            let config = CascadeConfig::from_file(&path)
                .with_context(|| format!("failed to load configuration from {path}"))?;
            Ok(config.merge_env(|key| std::env::var(key).ok()))
        }
        None => Ok(CascadeConfig::from_env()),
    }
}

fn load_rates() -> anyhow::Result<Vec<BankRate>> {
    let Ok(path) = std::env::var(ENV_RATES_FILE) else {
        return Ok(Vec::new());
    };
    let raw = std::fs::read_to_string(&path).with_context(|| format!("failed to read {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid bank rates in {path}"))
}

fn load_documents() -> anyhow::Result<Vec<Document>> {
    let Ok(dir) = std::env::var(ENV_DOCS_DIR) else {
        return Ok(Vec::new());
    };
    load_text_documents(&dir).with_context(|| format!("failed to load documents from {dir}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_tracing(config.server.log_json);
    config.validate().context("invalid configuration")?;

    let providers = Providers::from_config(&config)?;
    let settings = RecipeSettings::from(&config);

    let rates_store = Arc::new(InMemoryVectorStore::new().with_metric(config.retrieval.metric));
    let rates = load_rates()?;
    if !rates.is_empty() {
        let stored = ingest_bank_rates(rates_store.as_ref(), providers.embedder.as_ref(), &rates).await?;
        tracing::info!(stored, "Seeded rates store");
    }
    let research_store = Arc::new(InMemoryVectorStore::new().with_metric(config.retrieval.metric));
    let documents = load_documents()?;
    if !documents.is_empty() {
        let stored = ingest_documents(
            research_store.as_ref(),
            providers.embedder.as_ref(),
            &documents,
            &TextSplitter::default(),
        )
        .await?;
        tracing::info!(documents = documents.len(), stored, "Seeded research store");
    }

    let state = AppState::build(
        rates_store,
        research_store,
        Arc::new(InMemorySessionStore::new()),
        &providers,
        &settings,
    )?;

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}
