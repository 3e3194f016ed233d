//! A brute-force in-memory `VectorStore`, used by engine-level tests the
//! way `cortex-storage::InMemoryStore` stands in for SurrealDB.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cortex_core::error::{CortexError, Result};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::types::{cosine_similarity, Vector, VectorHit};
use crate::vector_store::{MetadataFilter, VectorStore};

struct Point {
    vector: Vector,
    metadata: HashMap<String, Value>,
}

#[derive(Default)]
struct CollectionData {
    dimension: usize,
    points: HashMap<String, Point>,
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, CollectionData>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let mut guard = self.collections.write().await;
        let entry = guard.entry(name.to_string()).or_insert_with(|| CollectionData {
            dimension,
            points: HashMap::new(),
        });
        if entry.dimension != dimension && entry.points.is_empty() {
            entry.dimension = dimension;
        }
        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        vector: Vector,
        metadata: HashMap<String, Value>,
    ) -> Result<()> {
        let mut guard = self.collections.write().await;
        let entry = guard.entry(collection.to_string()).or_insert_with(|| CollectionData {
            dimension: vector.len(),
            points: HashMap::new(),
        });
        if !entry.points.is_empty() && vector.len() != entry.dimension {
            return Err(CortexError::invalid_argument(format!(
                "vector dimension {} does not match collection dimension {}",
                vector.len(),
                entry.dimension
            )));
        }
        entry.points.insert(id.to_string(), Point { vector, metadata });
        Ok(())
    }

    async fn delete(&self, collection: &str, filter: &MetadataFilter) -> Result<u64> {
        let mut guard = self.collections.write().await;
        let Some(data) = guard.get_mut(collection) else {
            return Ok(0);
        };
        let before = data.points.len();
        data.points.retain(|_, point| !filter.matches(&point.metadata));
        Ok((before - data.points.len()) as u64)
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<VectorHit>> {
        let guard = self.collections.read().await;
        let Some(data) = guard.get(collection) else {
            return Ok(vec![]);
        };
        let mut scored: Vec<VectorHit> = data
            .points
            .iter()
            .filter(|(_, point)| filter.matches(&point.metadata))
            .map(|(id, point)| VectorHit {
                id: id.clone(),
                score: cosine_similarity(vector, &point.vector),
                metadata: point.metadata.clone(),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn search_returns_closest_first() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        store.upsert("c", "a", vec![1.0, 0.0], HashMap::new()).await.unwrap();
        store.upsert("c", "b", vec![0.0, 1.0], HashMap::new()).await.unwrap();

        let hits = store
            .search("c", &[1.0, 0.0], 2, &MetadataFilter::new())
            .await
            .unwrap();
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn delete_removes_points_matching_folder_id_only() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 1).await.unwrap();
        store
            .upsert("c", "a", vec![1.0], HashMap::from([("folder_id".into(), json!("f1"))]))
            .await
            .unwrap();
        store
            .upsert("c", "b", vec![1.0], HashMap::from([("folder_id".into(), json!("f2"))]))
            .await
            .unwrap();

        let deleted = store
            .delete("c", &MetadataFilter::new().eq("folder_id", "f1"))
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let remaining = store.search("c", &[1.0], 10, &MetadataFilter::new()).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "b");
    }

    #[tokio::test]
    async fn metadata_filter_scopes_search() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 1).await.unwrap();
        store
            .upsert("c", "a", vec![1.0], HashMap::from([("language".into(), json!("rust"))]))
            .await
            .unwrap();
        store
            .upsert("c", "b", vec![1.0], HashMap::from([("language".into(), json!("python"))]))
            .await
            .unwrap();

        let hits = store
            .search("c", &[1.0], 10, &MetadataFilter::new().eq("language", "rust"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }
}
