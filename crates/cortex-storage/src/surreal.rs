//! SurrealDB-backed `DocStore`.

use std::sync::Arc;

use async_trait::async_trait;
use cortex_core::error::{CortexError, Result};
use serde_json::Value;

use crate::docstore::DocStore;
use crate::filter::{Filter, FilterValue, IndexSpec, Sort};
use crate::pool::ConnectionPool;

pub struct SurrealStore {
    pool: Arc<ConnectionPool>,
}

impl SurrealStore {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    pub async fn with_schema(pool: Arc<ConnectionPool>) -> Result<Self> {
        let conn = pool.get().await?;
        crate::schema::init_schema(&conn).await?;
        Ok(Self::new(pool))
    }
}

/// Table and field names reach SurrealQL by string interpolation (SurrealDB
/// has no bind-parameter support for identifiers); both come from our own
/// code, never from external input, but we still reject anything that isn't
/// a plain identifier as a defence against a future caller passing one
/// through unchecked.
fn validate_identifier(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    if ok {
        Ok(())
    } else {
        Err(CortexError::invalid_argument(format!(
            "'{name}' is not a valid collection/field identifier"
        )))
    }
}

/// A record's `id` field is a SurrealDB `Thing` (e.g. `human_tasks:⟨uuid⟩`),
/// not the bare id string every engine filters on; `meta::id(id)` projects
/// out just the id portion so `WHERE meta::id(id) = $p0` matches the plain
/// `CortexId` string callers pass to `Filter::eq("id", ...)`.
fn where_field(field: &str) -> String {
    if field == "id" {
        "meta::id(id)".to_string()
    } else {
        field.to_string()
    }
}

fn build_where(filter: &Filter) -> Result<(String, Vec<(String, Value)>)> {
    if filter.is_empty() {
        return Ok((String::new(), vec![]));
    }
    let mut clauses = Vec::new();
    let mut binds = Vec::new();
    for (i, (field, rule)) in filter.iter().enumerate() {
        validate_identifier(field)?;
        let param = format!("p{i}");
        let (op, value) = match rule {
            FilterValue::Eq(v) => ("=", v.clone()),
            FilterValue::Ne(v) => ("!=", v.clone()),
            FilterValue::Gt(v) => (">", v.clone()),
            FilterValue::Gte(v) => (">=", v.clone()),
            FilterValue::Lt(v) => ("<", v.clone()),
            FilterValue::Lte(v) => ("<=", v.clone()),
            FilterValue::In(values) => ("INSIDE", Value::Array(values.clone())),
        };
        clauses.push(format!("{} {op} ${param}", where_field(field)));
        binds.push((param, value));
    }
    Ok((format!("WHERE {}", clauses.join(" AND ")), binds))
}

#[async_trait]
impl DocStore for SurrealStore {
    async fn insert(&self, collection: &str, id: &str, mut doc: Value) -> Result<()> {
        validate_identifier(collection)?;
        let db = self.pool.get().await?;
        if let Some(obj) = doc.as_object_mut() {
            obj.remove("id");
        }
        let _: Option<Value> = db
            .upsert((collection, id))
            .content(doc)
            .await
            .map_err(|e| CortexError::unavailable(format!("docstore insert failed: {e}")))?;
        Ok(())
    }

    async fn update(&self, collection: &str, filter: &Filter, patch: Value) -> Result<u64> {
        validate_identifier(collection)?;
        let db = self.pool.get().await?;
        let (where_clause, binds) = build_where(filter)?;
        let query = format!("UPDATE {collection} MERGE $patch {where_clause} RETURN BEFORE");
        let mut q = db.query(query).bind(("patch", patch));
        for (k, v) in binds {
            q = q.bind((k, v));
        }
        let mut result = q
            .await
            .map_err(|e| CortexError::unavailable(format!("docstore update failed: {e}")))?;
        let before: Vec<Value> = result
            .take(0)
            .map_err(|e| CortexError::internal(format!("docstore update result: {e}")))?;
        Ok(before.len() as u64)
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<u64> {
        validate_identifier(collection)?;
        let db = self.pool.get().await?;
        let (where_clause, binds) = build_where(filter)?;
        let query = format!("DELETE FROM {collection} {where_clause} RETURN BEFORE");
        let mut q = db.query(query);
        for (k, v) in binds {
            q = q.bind((k, v));
        }
        let mut result = q
            .await
            .map_err(|e| CortexError::unavailable(format!("docstore delete failed: {e}")))?;
        let before: Vec<Value> = result
            .take(0)
            .map_err(|e| CortexError::internal(format!("docstore delete result: {e}")))?;
        Ok(before.len() as u64)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Value>> {
        validate_identifier(collection)?;
        let db = self.pool.get().await?;
        let (where_clause, binds) = build_where(filter)?;
        let mut query =
            format!("SELECT *, meta::id(id) AS id FROM {collection} {where_clause}");
        if let Some(sort) = sort {
            validate_identifier(&sort.field)?;
            query.push_str(&format!(
                " ORDER BY {} {}",
                where_field(&sort.field),
                if sort.descending { "DESC" } else { "ASC" }
            ));
            if let Some(then_by) = &sort.then_by {
                validate_identifier(&then_by.field)?;
                query.push_str(&format!(
                    ", {} {}",
                    where_field(&then_by.field),
                    if then_by.descending { "DESC" } else { "ASC" }
                ));
            }
        }
        if let Some(limit) = limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = offset {
            query.push_str(&format!(" START {offset}"));
        }
        let mut q = db.query(query);
        for (k, v) in binds {
            q = q.bind((k, v));
        }
        let mut result = q
            .await
            .map_err(|e| CortexError::unavailable(format!("docstore find failed: {e}")))?;
        let docs: Vec<Value> = result
            .take(0)
            .map_err(|e| CortexError::internal(format!("docstore find result: {e}")))?;
        Ok(docs)
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>> {
        let mut docs = self.find(collection, filter, None, Some(1), None).await?;
        Ok(docs.pop())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        validate_identifier(collection)?;
        let db = self.pool.get().await?;
        let (where_clause, binds) = build_where(filter)?;
        let query = format!("SELECT count() FROM {collection} {where_clause} GROUP ALL");
        let mut q = db.query(query);
        for (k, v) in binds {
            q = q.bind((k, v));
        }
        let mut result = q
            .await
            .map_err(|e| CortexError::unavailable(format!("docstore count failed: {e}")))?;
        let count: Option<i64> = result.take("count").unwrap_or(None);
        Ok(count.unwrap_or(0) as u64)
    }

    async fn ensure_index(&self, collection: &str, spec: &IndexSpec) -> Result<()> {
        validate_identifier(collection)?;
        validate_identifier(&spec.field)?;
        let db = self.pool.get().await?;
        let index_name = format!("{collection}_{}", spec.field);
        let unique = if spec.unique { " UNIQUE" } else { "" };
        let query = format!(
            "DEFINE INDEX {index_name} ON {collection} FIELDS {}{unique}",
            spec.field
        );
        db.query(query)
            .await
            .map_err(|e| CortexError::unavailable(format!("docstore ensure_index failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionConfig;
    use serde_json::json;

    async fn test_store() -> SurrealStore {
        let config = ConnectionConfig::memory();
        let pool = Arc::new(ConnectionPool::new(config));
        pool.initialize().await.unwrap();
        SurrealStore::with_schema(pool).await.unwrap()
    }

    #[tokio::test]
    async fn insert_find_delete_roundtrip() {
        let store = test_store().await;
        store
            .insert("human_tasks", "t1", json!({"id": "t1", "status": "pending"}))
            .await
            .unwrap();

        let found = store
            .find_one("human_tasks", &Filter::new().eq("status", "pending"))
            .await
            .unwrap();
        assert!(found.is_some());

        let deleted = store
            .delete("human_tasks", &Filter::new().eq("id", "t1"))
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let gone = store
            .find_one("human_tasks", &Filter::new().eq("id", "t1"))
            .await
            .unwrap();
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn rejects_non_identifier_collection_names() {
        let store = test_store().await;
        let err = store
            .insert("bad; DROP TABLE x", "1", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
    }
}
