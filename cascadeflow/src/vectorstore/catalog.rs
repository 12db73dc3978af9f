//! Product catalog manager layered on the vector store contract.

use super::{MetadataFilter, VectorRecord, VectorStore};
use crate::errors::CascadeError;
use crate::providers::EmbeddingProvider;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

const SNIPPET_CHARS: usize = 100;

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Record id in the store.
    #[serde(alias = "product_id")]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Embedded together with the name.
    pub description: String,
    /// Category used for filtering.
    pub category: String,
    /// Unit price.
    pub price: f64,
    /// Availability.
    pub in_stock: bool,
}

impl Product {
    /// The text that gets embedded for semantic search.
    #[must_use]
    pub fn document_text(&self) -> String {
        format!(
            "{}. {} Category: {}. Price: ${}.",
            self.name, self.description, self.category, self.price
        )
    }

    /// The metadata used for filtering.
    #[must_use]
    pub fn metadata(&self) -> serde_json::Value {
        json!({
            "product_id": self.id,
            "category": self.category,
            "price": self.price,
            "in_stock": self.in_stock,
            "name": self.name,
        })
    }
}

/// Partial update to a product. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductUpdate {
    /// New price.
    pub price: Option<f64>,
    /// New availability.
    pub in_stock: Option<bool>,
    /// Replaces the embedded document text.
    pub description: Option<String>,
}

/// A catalog search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogHit {
    /// 1-based position in the results.
    pub rank: usize,
    /// Product id.
    pub id: String,
    /// Product name.
    pub name: String,
    /// Product price.
    pub price: f64,
    /// Product availability.
    pub in_stock: bool,
    /// Product category.
    pub category: String,
    /// Similarity to the query.
    pub score: f32,
    /// The first characters of the description.
    pub snippet: String,
}

/// CRUD manager for a product catalog stored in any [`VectorStore`].
#[derive(Debug, Clone)]
pub struct Catalog {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Catalog {
    /// Creates a catalog over a store and embedder.
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    /// Embeds and stores products. Returns how many were added.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or the store fails.
    pub async fn add_products(&self, products: &[Product]) -> Result<usize, CascadeError> {
        for product in products {
            let document = product.document_text();
            let vector = self.embedder.embed(&document).await?;
            self.store
                .upsert(
                    VectorRecord::new(&product.id, vector)
                        .with_metadata(product.metadata())
                        .with_document(document),
                )
                .await?;
        }
        tracing::info!(count = products.len(), "Added products to catalog");
        Ok(products.len())
    }

    /// Semantic search with an optional metadata filter.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or the store fails.
    pub async fn search(
        &self,
        text: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<CatalogHit>, CascadeError> {
        let vector = self.embedder.embed(text).await?;
        let hits = self.store.query(&vector, k, filter).await?;

        Ok(hits
            .into_iter()
            .map(|hit| {
                let meta = &hit.record.metadata;
                CatalogHit {
                    rank: hit.rank,
                    id: hit.record.id.clone(),
                    name: meta["name"].as_str().unwrap_or_default().to_string(),
                    price: meta["price"].as_f64().unwrap_or_default(),
                    in_stock: meta["in_stock"].as_bool().unwrap_or_default(),
                    category: meta["category"].as_str().unwrap_or_default().to_string(),
                    score: hit.score,
                    snippet: snippet(hit.record.document.as_deref().unwrap_or_default()),
                }
            })
            .collect())
    }

    /// Applies a partial update. Returns false if the product does not exist.
    ///
    /// A new description is re-embedded; price and stock changes keep the
    /// existing vector.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or the store fails.
    pub async fn update_product(&self, id: &str, update: ProductUpdate) -> Result<bool, CascadeError> {
        let Some(mut record) = self.store.get(id).await? else {
            tracing::debug!(id, "Product not found for update");
            return Ok(false);
        };

        if let Some(meta) = record.metadata.as_object_mut() {
            if let Some(price) = update.price {
                meta.insert("price".to_string(), json!(price));
            }
            if let Some(in_stock) = update.in_stock {
                meta.insert("in_stock".to_string(), json!(in_stock));
            }
        }

        if let Some(description) = update.description.filter(|d| !d.is_empty()) {
            record.vector = self.embedder.embed(&description).await?;
            record.document = Some(description);
        }

        self.store.upsert(record).await?;
        tracing::info!(id, "Updated product");
        Ok(true)
    }

    /// Deletes a product. Returns false if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn delete_product(&self, id: &str) -> Result<bool, CascadeError> {
        let deleted = self.store.delete(id).await?;
        if deleted {
            tracing::info!(id, "Deleted product");
        }
        Ok(deleted)
    }

    /// Returns the number of products.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn count(&self) -> Result<usize, CascadeError> {
        Ok(self.store.count().await?)
    }
}

fn snippet(document: &str) -> String {
    if document.chars().count() > SNIPPET_CHARS {
        let head: String = document.chars().take(SNIPPET_CHARS).collect();
        format!("{head}...")
    } else {
        document.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::HashingEmbedder;
    use crate::vectorstore::InMemoryVectorStore;
    use pretty_assertions::assert_eq;

    fn product(id: &str, name: &str, category: &str, price: f64, in_stock: bool) -> Product {
        Product {
            id: id.to_string(),
            name: name.to_string(),
            description: format!("A high-quality {} by {}.", category.to_lowercase(), name),
            category: category.to_string(),
            price,
            in_stock,
        }
    }

    async fn catalog() -> (Catalog, Arc<InMemoryVectorStore>) {
        let store = Arc::new(InMemoryVectorStore::new());
        let catalog = Catalog::new(store.clone(), Arc::new(HashingEmbedder::default()));
        catalog
            .add_products(&[
                product("prod_001", "Dell Laptop Black", "Laptop", 899.0, true),
                product("prod_002", "Apple Laptop Silver", "Laptop", 1299.0, true),
                product("prod_003", "Sony Headphones Blue", "Headphones", 199.0, false),
            ])
            .await
            .unwrap();
        (catalog, store)
    }

    #[tokio::test]
    async fn test_add_and_count() {
        let (catalog, _) = catalog().await;
        assert_eq!(catalog.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_filtered_search() {
        let (catalog, _) = catalog().await;
        let filter = MetadataFilter::parse(&json!({
            "$and": [{"category": {"$eq": "Laptop"}}, {"price": {"$lte": 1000.0}}]
        }))
        .unwrap();

        let hits = catalog.search("powerful laptop", 5, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "prod_001");
        assert_eq!(hits[0].rank, 1);
        assert_eq!(hits[0].category, "Laptop");
    }

    #[tokio::test]
    async fn test_semantic_search_prefers_matching_words() {
        let (catalog, _) = catalog().await;
        let hits = catalog.search("sony headphones", 1, None).await.unwrap();
        assert_eq!(hits[0].id, "prod_003");
    }

    #[tokio::test]
    async fn test_update_product() {
        let (catalog, store) = catalog().await;
        let before = store.get("prod_002").await.unwrap().unwrap();

        let updated = catalog
            .update_product(
                "prod_002",
                ProductUpdate {
                    price: Some(49.99),
                    in_stock: Some(false),
                    description: Some("Apple Laptop Space Gray. Currently on backorder.".to_string()),
                },
            )
            .await
            .unwrap();
        assert!(updated);

        let after = store.get("prod_002").await.unwrap().unwrap();
        assert_eq!(after.metadata["price"], json!(49.99));
        assert_eq!(after.metadata["in_stock"], json!(false));
        assert_eq!(after.metadata["name"], json!("Apple Laptop Silver"));
        assert_eq!(
            after.document.as_deref(),
            Some("Apple Laptop Space Gray. Currently on backorder.")
        );
        assert_ne!(after.vector, before.vector);
    }

    #[tokio::test]
    async fn test_update_without_description_keeps_vector() {
        let (catalog, store) = catalog().await;
        let before = store.get("prod_001").await.unwrap().unwrap();

        catalog
            .update_product("prod_001", ProductUpdate { price: Some(1.0), ..ProductUpdate::default() })
            .await
            .unwrap();

        let after = store.get("prod_001").await.unwrap().unwrap();
        assert_eq!(after.vector, before.vector);
        assert_eq!(after.document, before.document);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing() {
        let (catalog, _) = catalog().await;
        assert!(!catalog.update_product("prod_999", ProductUpdate::default()).await.unwrap());
        assert!(!catalog.delete_product("prod_999").await.unwrap());

        assert!(catalog.delete_product("prod_003").await.unwrap());
        assert_eq!(catalog.count().await.unwrap(), 2);
    }

    #[test]
    fn test_snippet_truncates_on_char_boundary() {
        let long = "é".repeat(150);
        let s = snippet(&long);
        assert!(s.ends_with("..."));
        assert_eq!(s.chars().count(), 103);
        assert_eq!(snippet("short"), "short");
    }

    #[test]
    fn test_product_document_text() {
        let p = product("p", "Casio Watch Red", "Watch", 59.5, true);
        assert_eq!(
            p.document_text(),
            "Casio Watch Red. A high-quality watch by Casio Watch Red. Category: Watch. Price: $59.5."
        );
        assert_eq!(p.metadata()["product_id"], json!("p"));
    }
}
