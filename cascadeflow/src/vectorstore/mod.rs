//! Vector store contract and backends.
//!
//! Every backend implements the same small CRUD contract so retrieval
//! stages and the [`Catalog`] manager are written once against
//! [`VectorStore`]. [`InMemoryVectorStore`] is the bundled backend.

mod catalog;
mod filter;
mod inmemory;

pub use catalog::{Catalog, CatalogHit, Product, ProductUpdate};
pub use filter::{Comparison, MetadataFilter};
pub use inmemory::InMemoryVectorStore;

use crate::errors::VectorStoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Debug;

/// How query vectors are compared to stored vectors.
///
/// Scores are always "higher is closer".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine similarity in `[-1, 1]`.
    #[default]
    Cosine,
    /// Negated L2 distance.
    Euclidean,
    /// Raw dot product.
    DotProduct,
}

impl DistanceMetric {
    /// Scores `b` against `a`. Both slices must have the same length.
    #[must_use]
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => {
                let dot = dot(a, b);
                let norms = norm(a) * norm(b);
                if norms == 0.0 {
                    0.0
                } else {
                    dot / norms
                }
            }
            Self::Euclidean => {
                let sum: f32 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
                -sum.sqrt()
            }
            Self::DotProduct => dot(a, b),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f32]) -> f32 {
    dot(a, a).sqrt()
}

/// A stored vector with its metadata and optional source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Unique key; upserting an existing id replaces the record.
    pub id: String,
    /// Embedding; its length must match the collection dimension.
    pub vector: Vec<f32>,
    /// JSON object used for filtering.
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Source text the vector was computed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
}

impl VectorRecord {
    /// Creates a record with empty metadata.
    #[must_use]
    pub fn new(id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            vector,
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            document: None,
        }
    }

    /// Sets the metadata object.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Sets the source document text.
    #[must_use]
    pub fn with_document(mut self, document: impl Into<String>) -> Self {
        self.document = Some(document.into());
        self
    }
}

/// A query hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    /// The matched record.
    pub record: VectorRecord,
    /// Similarity under the store's metric; higher is closer.
    pub score: f32,
    /// 1-based position in the result list.
    pub rank: usize,
}

/// The CRUD contract shared by all vector store backends.
#[async_trait]
pub trait VectorStore: Send + Sync + Debug {
    /// Inserts or replaces a record.
    ///
    /// The first record fixes the collection dimension.
    async fn upsert(&self, record: VectorRecord) -> Result<(), VectorStoreError>;

    /// Returns up to `k` records ranked by descending score.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredRecord>, VectorStoreError>;

    /// Removes a record. Returns false if it did not exist.
    async fn delete(&self, id: &str) -> Result<bool, VectorStoreError>;

    /// Fetches a record by id.
    async fn get(&self, id: &str) -> Result<Option<VectorRecord>, VectorStoreError>;

    /// Returns the number of stored records.
    async fn count(&self) -> Result<usize, VectorStoreError>;
}

/// Derives a stable record id from document text.
#[must_use]
pub fn content_id(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(&digest[..8])
}
