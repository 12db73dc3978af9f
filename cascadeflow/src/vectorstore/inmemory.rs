//! Brute-force vector store held in process memory.

use super::{DistanceMetric, MetadataFilter, ScoredRecord, VectorRecord, VectorStore};
use crate::errors::VectorStoreError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Collection {
    dimension: Option<usize>,
    records: BTreeMap<String, VectorRecord>,
}

/// Brute-force vector store held in process memory.
///
/// Queries score every record that passes the filter. Ties are broken by
/// id so results are deterministic.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVectorStore {
    metric: DistanceMetric,
    inner: Arc<RwLock<Collection>>,
}

impl InMemoryVectorStore {
    /// Creates an empty store using cosine similarity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the similarity metric.
    #[must_use]
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Returns the similarity metric.
    #[must_use]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Returns the collection dimension, once fixed.
    #[must_use]
    pub fn dimension(&self) -> Option<usize> {
        self.inner.read().dimension
    }

    fn check_dimension(expected: Option<usize>, actual: usize) -> Result<(), VectorStoreError> {
        match expected {
            Some(expected) if expected != actual => {
                Err(VectorStoreError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, mut record: VectorRecord) -> Result<(), VectorStoreError> {
        if record.vector.is_empty() {
            return Err(VectorStoreError::EmptyVector { id: record.id });
        }
        if record.metadata.is_null() {
            record.metadata = serde_json::Value::Object(serde_json::Map::new());
        }
        if !record.metadata.is_object() {
            return Err(VectorStoreError::InvalidMetadata { id: record.id });
        }

        let mut inner = self.inner.write();
        Self::check_dimension(inner.dimension, record.vector.len())?;
        inner.dimension = Some(record.vector.len());

        tracing::trace!(id = %record.id, "Upserting vector record");
        inner.records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredRecord>, VectorStoreError> {
        let inner = self.inner.read();
        if inner.records.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        Self::check_dimension(inner.dimension, vector.len())?;

        let mut scored: Vec<(f32, &VectorRecord)> = inner
            .records
            .values()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.metadata, r.document.as_deref())))
            .map(|r| (self.metric.score(vector, &r.vector), r))
            .collect();

        scored.sort_by(|(a, ra), (b, rb)| b.total_cmp(a).then_with(|| ra.id.cmp(&rb.id)));

        Ok(scored
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(i, (score, record))| ScoredRecord {
                record: record.clone(),
                score,
                rank: i + 1,
            })
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<bool, VectorStoreError> {
        Ok(self.inner.write().records.remove(id).is_some())
    }

    async fn get(&self, id: &str) -> Result<Option<VectorRecord>, VectorStoreError> {
        Ok(self.inner.read().records.get(id).cloned())
    }

    async fn count(&self) -> Result<usize, VectorStoreError> {
        Ok(self.inner.read().records.len())
    }
}
