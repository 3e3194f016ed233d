//! The KnowledgeEngine (spec §4.2): write-through persistence across
//! DocStore + VectorStore, and read paths that prefer semantic search but
//! degrade gracefully to DocStore substring search.

use std::collections::HashMap;
use std::sync::Arc;

use cortex_core::error::{CortexError, Result};
use cortex_core::{
    Clock, CortexId, KnowledgeEntry, PopularCollection, CollectionDescriptor, WELL_KNOWN_COLLECTIONS,
};
use cortex_semantic::{Embedder, MetadataFilter, VectorStore};
use cortex_storage::{Collection, DocStore, Filter, Sort};
use serde_json::Value;
use tracing::warn;

/// Synthetic similarity score attached to DocStore fallback-search hits,
/// since substring matches carry no real notion of relevance (spec §4.2
/// read policy, step 2).
const FALLBACK_SCORE: f32 = 0.5;

/// One hit from `KnowledgeEngine::query`, paired with its similarity score
/// whether it came from the vector path or the fallback path.
#[derive(Debug, Clone)]
pub struct KnowledgeHit {
    pub entry: KnowledgeEntry,
    pub score: f32,
}

/// A well-known collection merged with whatever is actually observed in
/// storage (spec §4.2 "Collection directory").
#[derive(Debug, Clone)]
pub struct CollectionDirectoryEntry {
    pub name: String,
    pub purpose: Option<&'static str>,
    pub category: Option<&'static str>,
    pub example_query: Option<&'static str>,
    pub has_data: bool,
}

pub struct KnowledgeEngine {
    entries: Collection<KnowledgeEntry>,
    embedder: Option<Arc<dyn Embedder>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    clock: Arc<dyn Clock>,
}

impl KnowledgeEngine {
    pub fn new(
        store: Arc<dyn DocStore>,
        embedder: Option<Arc<dyn Embedder>>,
        vector_store: Option<Arc<dyn VectorStore>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            entries: Collection::new(store, "knowledge_entries"),
            embedder,
            vector_store,
            clock,
        }
    }

    /// Write-through policy (spec §4.2): the DocStore write always happens;
    /// the vector write is attempted first but its failure never fails the
    /// whole operation, only the internal `vector_indexed` flag.
    pub async fn write(
        &self,
        collection: String,
        text: String,
        metadata: HashMap<String, Value>,
    ) -> Result<KnowledgeEntry> {
        if collection.trim().is_empty() {
            return Err(CortexError::invalid_argument("collection must not be empty"));
        }
        if text.trim().is_empty() {
            return Err(CortexError::invalid_argument("text must not be empty"));
        }
        let now = self.clock.now();
        let mut entry = KnowledgeEntry::new(collection, text, metadata, now);
        entry.vector_indexed = self.try_vector_write(&entry).await;
        self.entries.insert(&entry.id.to_string(), &entry).await?;
        Ok(entry)
    }

    async fn try_vector_write(&self, entry: &KnowledgeEntry) -> bool {
        let (Some(embedder), Some(vector_store)) = (&self.embedder, &self.vector_store) else {
            return false;
        };
        let vector = match embedder.embed(&entry.text).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, collection = %entry.collection, "embedding failed, storing without vector");
                return false;
            }
        };
        if let Err(e) = vector_store.ensure_collection(&entry.collection, embedder.dimension()).await {
            warn!(error = %e, collection = %entry.collection, "failed to ensure vector collection");
            return false;
        }
        let mut envelope = entry.metadata.clone();
        envelope.insert("id".to_string(), Value::String(entry.id.to_string()));
        envelope.insert("collection".to_string(), Value::String(entry.collection.clone()));
        match vector_store.upsert(&entry.collection, &entry.id.to_string(), vector, envelope).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, collection = %entry.collection, "vector upsert failed, storing without vector");
                false
            }
        }
    }

    /// Read policy (spec §4.2 `Query`): prefers semantic search, falls back
    /// to DocStore substring search, and surfaces `Unavailable` only if
    /// both paths are unusable.
    pub async fn query(&self, collection: &str, query: &str, limit: usize) -> Result<Vec<KnowledgeHit>> {
        let has_vector_data = self
            .entries
            .count(&Filter::new().eq("collection", collection).eq("vector_indexed", true))
            .await?
            > 0;

        if has_vector_data {
            if let (Some(embedder), Some(vector_store)) = (&self.embedder, &self.vector_store) {
                return self.query_via_vectors(collection, query, limit, embedder, vector_store).await;
            }
        }
        self.query_via_fallback(collection, query, limit).await
    }

    async fn query_via_vectors(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
        embedder: &Arc<dyn Embedder>,
        vector_store: &Arc<dyn VectorStore>,
    ) -> Result<Vec<KnowledgeHit>> {
        let vector = embedder.embed(query).await?;
        let hits = vector_store
            .search(collection, &vector, limit, &MetadataFilter::new())
            .await?;
        let mut out = Vec::with_capacity(hits.len());
        for hit in hits {
            let Some(entry) = self
                .entries
                .find_one(&Filter::new().eq("id", hit.id.clone()))
                .await?
            else {
                continue;
            };
            // invariant (spec §8 item 8): never return an entry from a
            // different collection than the one queried.
            if entry.collection != collection {
                continue;
            }
            out.push(KnowledgeHit { entry, score: hit.score });
        }
        Ok(out)
    }

    async fn query_via_fallback(&self, collection: &str, query: &str, limit: usize) -> Result<Vec<KnowledgeHit>> {
        let candidates = self
            .entries
            .find(
                &Filter::new().eq("collection", collection),
                Some(&Sort::desc("created_at")),
                None,
                None,
            )
            .await?;
        let needle = query.to_ascii_lowercase();
        let mut out = Vec::new();
        for entry in candidates {
            let text_matches = entry.text.to_ascii_lowercase().contains(&needle);
            let metadata_matches = entry
                .metadata
                .values()
                .any(|v| value_contains(v, &needle));
            if needle.is_empty() || text_matches || metadata_matches {
                out.push(KnowledgeHit { entry, score: FALLBACK_SCORE });
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Removes the DocStore record and, best-effort, the matching
    /// VectorStore point (SPEC_FULL §4.2 supplement).
    pub async fn delete_entry(&self, id: CortexId, collection: &str) -> Result<()> {
        let deleted = self.entries.delete(&Filter::new().eq("id", id.to_string())).await?;
        if deleted == 0 {
            return Err(CortexError::not_found("knowledge_entry", id.to_string()));
        }
        if let Some(vector_store) = &self.vector_store {
            let filter = MetadataFilter::new().eq("id", id.to_string());
            if let Err(e) = vector_store.delete(collection, &filter).await {
                warn!(error = %e, %collection, id = %id, "best-effort vector delete failed");
            }
        }
        Ok(())
    }

    /// `GetPopularCollections(limit)` (spec §4.2): collections sorted by
    /// entry count descending, zero-entry collections excluded.
    pub async fn popular_collections(&self, limit: usize) -> Result<Vec<PopularCollection>> {
        let all = self.entries.find(&Filter::new(), None, None, None).await?;
        let mut by_collection: HashMap<String, (u64, chrono::DateTime<chrono::Utc>)> = HashMap::new();
        for entry in all {
            let slot = by_collection
                .entry(entry.collection.clone())
                .or_insert((0, entry.created_at));
            slot.0 += 1;
            if entry.created_at > slot.1 {
                slot.1 = entry.created_at;
            }
        }
        let mut popular: Vec<PopularCollection> = by_collection
            .into_iter()
            .map(|(collection, (entry_count, last_activity_at))| PopularCollection {
                collection,
                entry_count,
                last_activity_at,
            })
            .collect();
        popular.sort_by(|a, b| b.entry_count.cmp(&a.entry_count));
        popular.truncate(limit);
        Ok(popular)
    }

    /// `GetRecentLearnings` (spec §4.2): entries from the last 24h, grouped
    /// by collection.
    pub async fn recent_learnings(&self) -> Result<HashMap<String, Vec<KnowledgeEntry>>> {
        let cutoff = self.clock.now() - chrono::Duration::hours(24);
        let recent = self
            .entries
            .find(&Filter::new().gt("created_at", cutoff.to_rfc3339()), Some(&Sort::desc("created_at")), None, None)
            .await?;
        let mut grouped: HashMap<String, Vec<KnowledgeEntry>> = HashMap::new();
        for entry in recent {
            grouped.entry(entry.collection.clone()).or_default().push(entry);
        }
        Ok(grouped)
    }

    /// Collection directory (spec §4.2): the static well-known table merged
    /// at read time with whatever collections are actually observed.
    pub async fn collection_directory(&self) -> Result<Vec<CollectionDirectoryEntry>> {
        let all = self.entries.find(&Filter::new(), None, None, None).await?;
        let mut observed: HashMap<String, bool> = HashMap::new();
        for entry in &all {
            observed.insert(entry.collection.clone(), true);
        }

        let mut out = Vec::new();
        for descriptor in WELL_KNOWN_COLLECTIONS {
            let has_data = observed.remove(descriptor.name).unwrap_or(false);
            out.push(describe(descriptor, has_data));
        }
        for (name, _) in observed {
            out.push(CollectionDirectoryEntry {
                name,
                purpose: None,
                category: None,
                example_query: None,
                has_data: true,
            });
        }
        Ok(out)
    }
}

fn describe(descriptor: &CollectionDescriptor, has_data: bool) -> CollectionDirectoryEntry {
    CollectionDirectoryEntry {
        name: descriptor.name.to_string(),
        purpose: Some(descriptor.purpose),
        category: Some(descriptor.category),
        example_query: Some(descriptor.example_query),
        has_data,
    }
}

fn value_contains(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.to_ascii_lowercase().contains(needle),
        Value::Array(items) => items.iter().any(|v| value_contains(v, needle)),
        Value::Object(map) => map.values().any(|v| value_contains(v, needle)),
        _ => value.to_string().to_ascii_lowercase().contains(needle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_semantic::{DeterministicEmbedder, InMemoryVectorStore};
    use cortex_core::SystemClock;
    use cortex_storage::InMemoryStore;

    fn engine_with_vectors() -> KnowledgeEngine {
        KnowledgeEngine::new(
            InMemoryStore::new(),
            Some(Arc::new(DeterministicEmbedder::new(32))),
            Some(InMemoryVectorStore::new()),
            Arc::new(SystemClock),
        )
    }

    fn engine_without_vectors() -> KnowledgeEngine {
        KnowledgeEngine::new(InMemoryStore::new(), None, None, Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn write_marks_vector_indexed_when_backends_present() {
        let engine = engine_with_vectors();
        let entry = engine
            .write("technical-knowledge".into(), "the cascade rule completes tasks".into(), HashMap::new())
            .await
            .unwrap();
        assert!(entry.vector_indexed);
    }

    #[tokio::test]
    async fn write_succeeds_without_vector_backends() {
        let engine = engine_without_vectors();
        let entry = engine
            .write("technical-knowledge".into(), "some fact".into(), HashMap::new())
            .await
            .unwrap();
        assert!(!entry.vector_indexed);
    }

    #[tokio::test]
    async fn query_prefers_vector_path_when_available() {
        let engine = engine_with_vectors();
        engine
            .write("technical-knowledge".into(), "rust ownership and borrowing".into(), HashMap::new())
            .await
            .unwrap();
        engine
            .write("adr".into(), "unrelated adr entry".into(), HashMap::new())
            .await
            .unwrap();

        let hits = engine.query("technical-knowledge", "ownership", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.collection, "technical-knowledge");
    }

    #[tokio::test]
    async fn query_falls_back_to_substring_search_without_vectors() {
        let engine = engine_without_vectors();
        engine
            .write("technical-knowledge".into(), "the quick brown fox".into(), HashMap::new())
            .await
            .unwrap();
        let hits = engine.query("technical-knowledge", "brown", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, FALLBACK_SCORE);
    }

    #[tokio::test]
    async fn delete_entry_removes_docstore_record() {
        let engine = engine_with_vectors();
        let entry = engine
            .write("technical-knowledge".into(), "to be deleted".into(), HashMap::new())
            .await
            .unwrap();
        engine.delete_entry(entry.id, "technical-knowledge").await.unwrap();
        let hits = engine.query("technical-knowledge", "deleted", 10).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn popular_collections_excludes_empty_and_sorts_by_count() {
        let engine = engine_without_vectors();
        for _ in 0..3 {
            engine.write("technical-knowledge".into(), "x".into(), HashMap::new()).await.unwrap();
        }
        engine.write("adr".into(), "y".into(), HashMap::new()).await.unwrap();

        let popular = engine.popular_collections(10).await.unwrap();
        assert_eq!(popular[0].collection, "technical-knowledge");
        assert_eq!(popular[0].entry_count, 3);
    }

    #[tokio::test]
    async fn collection_directory_merges_well_known_and_observed() {
        let engine = engine_without_vectors();
        engine.write("custom-collection".into(), "z".into(), HashMap::new()).await.unwrap();

        let directory = engine.collection_directory().await.unwrap();
        let technical = directory.iter().find(|d| d.name == "technical-knowledge").unwrap();
        assert!(!technical.has_data);
        let custom = directory.iter().find(|d| d.name == "custom-collection").unwrap();
        assert!(custom.has_data);
        assert!(custom.purpose.is_none());
    }
}
