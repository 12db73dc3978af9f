use super::{EmbeddingProvider, ProviderError};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Deterministic offline embedder.
///
/// Lowercased alphanumeric tokens are hashed into a fixed number of signed
/// buckets and the result is L2-normalised, so texts sharing words score
/// close under cosine similarity. Useful for tests and demos without an
/// embedding API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dimension: 256 }
    }
}

impl HashingEmbedder {
    /// Creates an embedder with the given number of buckets.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Returns the vector dimension.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embeds text synchronously.
    #[must_use]
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
        {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.embed_sync(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectorstore::DistanceMetric;

    #[test]
    fn test_deterministic_and_normalised() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed_sync("Fixed deposit rates in China");
        let b = embedder.embed_sync("Fixed deposit rates in China");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let embedder = HashingEmbedder::default();
        assert_eq!(embedder.embed_sync("China, ICBC!"), embedder.embed_sync("china icbc"));
    }

    #[test]
    fn test_shared_words_score_higher() {
        let embedder = HashingEmbedder::default();
        let query = embedder.embed_sync("headphones for running");
        let close = embedder.embed_sync("Sony headphones great for running");
        let far = embedder.embed_sync("ceramic coffee mug");

        let metric = DistanceMetric::Cosine;
        assert!(metric.score(&query, &close) > metric.score(&query, &far));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert!(embedder.embed_sync("  ").iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn test_embedding_provider_impl() {
        let vector = HashingEmbedder::new(16).embed("x").await.unwrap();
        assert_eq!(vector.len(), 16);
    }
}
