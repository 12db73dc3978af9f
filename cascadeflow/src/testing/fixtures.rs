//! Sample data and seeded stores for tests.

use std::sync::Arc;

use crate::providers::HashingEmbedder;
use crate::recipes::{ingest_bank_rates, BankRate};
use crate::vectorstore::{InMemoryVectorStore, VectorRecord, VectorStore};

const RESEARCH_DOCS: &[(&str, &str)] = &[
    (
        "hnsw",
        "Hierarchical navigable small world graphs give vector databases fast approximate nearest neighbour search.",
    ),
    (
        "pq",
        "Product quantization compresses vectors so large indexes fit in memory at some cost in recall.",
    ),
    (
        "hybrid",
        "Hybrid search combines keyword scoring with vector similarity to improve retrieval quality.",
    ),
    (
        "eval",
        "Retrieval benchmarks for vector indexes rarely cover filtered queries or frequent updates.",
    ),
];

/// Bank rates for eight countries, two banks for India.
#[must_use]
pub fn sample_bank_rates() -> Vec<BankRate> {
    [
        ("India", "SBI", "6.8%", "8.5%", "11.2%"),
        ("India", "HDFC", "7.0%", "8.7%", "10.9%"),
        ("USA", "Chase", "0.5%", "6.9%", "12.0%"),
        ("UK", "Barclays", "4.1%", "5.2%", "7.9%"),
        ("Australia", "CommBank", "4.5%", "6.1%", "9.5%"),
        ("Canada", "RBC", "3.9%", "5.4%", "8.8%"),
        ("UAE", "Emirates NBD", "3.5%", "4.9%", "6.5%"),
        ("Russia", "Sberbank", "15.0%", "12.5%", "19.0%"),
    ]
    .into_iter()
    .map(|(country, bank, fd_rate, home_loan, personal_loan)| BankRate {
        country: country.to_string(),
        bank: bank.to_string(),
        fd_rate: fd_rate.to_string(),
        home_loan: home_loan.to_string(),
        personal_loan: personal_loan.to_string(),
    })
    .collect()
}

/// An in-memory store holding [`sample_bank_rates`].
///
/// # Panics
///
/// Panics if ingestion fails.
pub async fn seeded_rates_store(embedder: &HashingEmbedder) -> Arc<InMemoryVectorStore> {
    let store = Arc::new(InMemoryVectorStore::new());
    ingest_bank_rates(store.as_ref(), embedder, &sample_bank_rates())
        .await
        .unwrap_or_else(|e| panic!("failed to seed rates store: {e}"));
    store
}

/// An in-memory store holding a few short notes on vector search.
///
/// # Panics
///
/// Panics if an upsert fails.
pub async fn seeded_research_store(embedder: &HashingEmbedder) -> Arc<InMemoryVectorStore> {
    let store = Arc::new(InMemoryVectorStore::new());
    for (id, text) in RESEARCH_DOCS {
        store
            .upsert(VectorRecord::new(*id, embedder.embed_sync(text)).with_document(*text))
            .await
            .unwrap_or_else(|e| panic!("failed to seed research store: {e}"));
    }
    store
}
