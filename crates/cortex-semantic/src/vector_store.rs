//! The `VectorStore` collaborator interface (spec §6.1): collection
//! lifecycle, point upsert/delete, nearest-neighbour search.

use std::collections::HashMap;

use async_trait::async_trait;
use cortex_core::error::Result;
use serde_json::Value;

use crate::types::{Vector, VectorHit};

/// A filter over point metadata, evaluated server-side by a real backend
/// and in-process by the in-memory fake. Only equality is needed by the
/// spec's callers (folder-id teardown, code-search file-type filters).
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    fields: HashMap<String, Value>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn matches(&self, metadata: &HashMap<String, Value>) -> bool {
        self.fields
            .iter()
            .all(|(k, v)| metadata.get(k) == Some(v))
    }

    /// Flattened `(field, string value)` pairs, for backends (Qdrant) whose
    /// filter condition builders want owned strings rather than `Value`.
    /// Non-string values are rendered via their JSON representation.
    pub(crate) fn as_str_pairs(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .map(|(k, v)| {
                let s = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
                (k.clone(), s)
            })
            .collect()
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Idempotent: converges concurrent callers on one collection of the
    /// declared dimension (spec §5 "collection creation is guarded").
    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()>;

    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        vector: Vector,
        metadata: HashMap<String, Value>,
    ) -> Result<()>;

    /// Returns the number of points deleted.
    async fn delete(&self, collection: &str, filter: &MetadataFilter) -> Result<u64>;

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<VectorHit>>;
}
