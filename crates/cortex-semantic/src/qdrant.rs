//! `QdrantStore`: the production `VectorStore` backed by the `qdrant-client`
//! crate, grounded on the teacher's `cortex-semantic/src/qdrant.rs` builder
//! usage (`CreateCollectionBuilder`, `UpsertPointsBuilder`,
//! `SearchPointsBuilder`) but trimmed to the operations the spec actually
//! names: ensure-collection, upsert, delete-by-metadata, search.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cortex_core::error::{CortexError, Result};
use dashmap::DashSet;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter as QdrantFilter,
    PointId, PointStruct, ScoredPoint, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::Value;

use crate::types::{Vector, VectorHit};
use crate::vector_store::{MetadataFilter, VectorStore};

pub struct QdrantStore {
    client: Qdrant,
    /// Collections we've already called `ensure_collection` for, so
    /// concurrent callers converge on one create-collection call
    /// (spec §5 "collection creation is guarded").
    known_collections: DashSet<String>,
}

impl QdrantStore {
    pub fn connect(url: &str, api_key: Option<&str>) -> Result<Arc<Self>> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key.to_string());
        }
        let client = builder
            .build()
            .map_err(|e| CortexError::unavailable(format!("qdrant client build failed: {e}")))?;
        Ok(Arc::new(Self {
            client,
            known_collections: DashSet::new(),
        }))
    }

    fn to_payload(metadata: HashMap<String, Value>) -> Payload {
        let mut payload = Payload::new();
        for (k, v) in metadata {
            payload.insert(k, v);
        }
        payload
    }

    fn to_metadata(point: &ScoredPoint) -> HashMap<String, Value> {
        point
            .payload
            .iter()
            .map(|(k, v)| (k.clone(), qdrant_value_to_json(v)))
            .collect()
    }

    fn to_filter(filter: &MetadataFilter) -> Option<QdrantFilter> {
        if filter.is_empty() {
            return None;
        }
        let conditions: Vec<Condition> = filter
            .as_str_pairs()
            .into_iter()
            .map(|(field, value)| Condition::matches(field, value))
            .collect();
        Some(QdrantFilter::must(conditions))
    }
}

/// Decodes a protobuf `google.protobuf.Value` (as qdrant-client models
/// payload values) into the JSON scalar it represents, rather than its
/// Debug string — `code_indexer::search_code`'s `file_types` filter reads
/// `metadata["language"]` back out as a plain string and would never match
/// a Debug-formatted `Value { kind: Some(StringValue("rust")) }`.
fn qdrant_value_to_json(v: &qdrant_client::qdrant::Value) -> Value {
    match &v.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(*b),
        Some(Kind::IntegerValue(i)) => Value::Number((*i).into()),
        Some(Kind::DoubleValue(d)) => {
            serde_json::Number::from_f64(*d).map(Value::Number).unwrap_or(Value::Null)
        }
        Some(Kind::StringValue(s)) => Value::String(s.clone()),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .iter()
                .map(|(k, v)| (k.clone(), qdrant_value_to_json(v)))
                .collect(),
        ),
        Some(Kind::ListValue(l)) => Value::Array(l.values.iter().map(qdrant_value_to_json).collect()),
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()> {
        if self.known_collections.contains(name) {
            return Ok(());
        }
        let exists = self
            .client
            .collection_exists(name)
            .await
            .map_err(|e| CortexError::unavailable(format!("qdrant collection_exists: {e}")))?;
        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(name)
                        .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
                )
                .await
                .map_err(|e| CortexError::unavailable(format!("qdrant create_collection: {e}")))?;
        }
        self.known_collections.insert(name.to_string());
        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        vector: Vector,
        metadata: HashMap<String, Value>,
    ) -> Result<()> {
        self.ensure_collection(collection, vector.len()).await?;
        let point_id = parse_point_id(id)?;
        let point = PointStruct::new(point_id, vector, Self::to_payload(metadata));
        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, vec![point]))
            .await
            .map_err(|e| CortexError::unavailable(format!("qdrant upsert failed: {e}")))?;
        Ok(())
    }

    async fn delete(&self, collection: &str, filter: &MetadataFilter) -> Result<u64> {
        let Some(qfilter) = Self::to_filter(filter) else {
            return Err(CortexError::invalid_argument(
                "vector-store delete requires a non-empty metadata filter",
            ));
        };
        self.client
            .delete_points(DeletePointsBuilder::new(collection).points(qfilter))
            .await
            .map_err(|e| CortexError::unavailable(format!("qdrant delete failed: {e}")))?;
        // Qdrant's delete response does not report a count; callers that need
        // an exact deleted-count (folder teardown tests) use the in-memory
        // fake, which does report one.
        Ok(0)
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<VectorHit>> {
        let mut builder = SearchPointsBuilder::new(collection, vector.to_vec(), limit as u64)
            .with_payload(true);
        if let Some(qfilter) = Self::to_filter(filter) {
            builder = builder.filter(qfilter);
        }
        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| CortexError::unavailable(format!("qdrant search failed: {e}")))?;
        Ok(response
            .result
            .iter()
            .filter_map(|point| {
                let id = point_id_to_string(point)?;
                Some(VectorHit { id, score: point.score, metadata: Self::to_metadata(point) })
            })
            .collect())
    }
}

/// Our chunk/entry ids are `CortexId`s (UUIDs) already — key Qdrant points
/// by that same UUID directly rather than rehashing it into an unrelated
/// one, so `search`'s returned id can be joined straight back against
/// DocStore by the caller.
fn parse_point_id(id: &str) -> Result<PointId> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| CortexError::invalid_argument(format!("vector id '{id}' is not a UUID: {e}")))?;
    Ok(PointId::from(uuid.to_string()))
}

/// Recovers the id string a `search` hit was upserted under, from the
/// point's own id rather than its Debug-rendered wrapper type.
fn point_id_to_string(point: &ScoredPoint) -> Option<String> {
    match point.id.as_ref()?.point_id_options.as_ref()? {
        PointIdOptions::Uuid(u) => Some(u.clone()),
        PointIdOptions::Num(n) => Some(n.to_string()),
    }
}
