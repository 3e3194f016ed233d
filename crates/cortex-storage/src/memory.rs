//! An in-memory `DocStore`, used by engine-level tests the way the teacher
//! uses `MemoryStorage` to avoid standing up SurrealDB per test.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cortex_core::error::Result;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::docstore::DocStore;
use crate::filter::{Filter, IndexSpec, Sort};

#[derive(Debug, Default)]
struct CollectionData {
    docs: HashMap<String, Value>,
    indexes: Vec<IndexSpec>,
}

#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, CollectionData>>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

fn sort_docs(docs: &mut [Value], sort: &Sort) {
    docs.sort_by(|a, b| sort_cmp(a, b, sort));
}

fn sort_cmp(a: &Value, b: &Value, sort: &Sort) -> std::cmp::Ordering {
    let av = a.get(&sort.field);
    let bv = b.get(&sort.field);
    let ord = match (av, bv) {
        (Some(a), Some(b)) => compare_values(a, b),
        (Some(_), None) => std::cmp::Ordering::Greater,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (None, None) => std::cmp::Ordering::Equal,
    };
    let ord = if sort.descending { ord.reverse() } else { ord };
    match (ord, &sort.then_by) {
        (std::cmp::Ordering::Equal, Some(next)) => sort_cmp(a, b, next),
        _ => ord,
    }
}

fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    if let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) {
        return a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal);
    }
    if let (Some(a), Some(b)) = (a.as_str(), b.as_str()) {
        return a.cmp(b);
    }
    std::cmp::Ordering::Equal
}

#[async_trait]
impl DocStore for InMemoryStore {
    async fn insert(&self, collection: &str, id: &str, doc: Value) -> Result<()> {
        let mut guard = self.collections.write().await;
        guard
            .entry(collection.to_string())
            .or_default()
            .docs
            .insert(id.to_string(), doc);
        Ok(())
    }

    async fn update(&self, collection: &str, filter: &Filter, patch: Value) -> Result<u64> {
        let mut guard = self.collections.write().await;
        let Some(data) = guard.get_mut(collection) else {
            return Ok(0);
        };
        let mut updated = 0u64;
        for doc in data.docs.values_mut() {
            if filter.matches(doc) {
                if let (Some(obj), Some(patch_obj)) = (doc.as_object_mut(), patch.as_object()) {
                    for (k, v) in patch_obj {
                        obj.insert(k.clone(), v.clone());
                    }
                }
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let mut guard = self.collections.write().await;
        let Some(data) = guard.get_mut(collection) else {
            return Ok(0);
        };
        let before = data.docs.len();
        data.docs.retain(|_, doc| !filter.matches(doc));
        Ok((before - data.docs.len()) as u64)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Value>> {
        let guard = self.collections.read().await;
        let Some(data) = guard.get(collection) else {
            return Ok(vec![]);
        };
        let mut matched: Vec<Value> = data
            .docs
            .values()
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect();
        if let Some(sort) = sort {
            sort_docs(&mut matched, sort);
        }
        let offset = offset.unwrap_or(0);
        let iter = matched.into_iter().skip(offset);
        Ok(match limit {
            Some(l) => iter.take(l).collect(),
            None => iter.collect(),
        })
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .and_then(|data| data.docs.values().find(|doc| filter.matches(doc)).cloned()))
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .map(|data| data.docs.values().filter(|doc| filter.matches(doc)).count() as u64)
            .unwrap_or(0))
    }

    async fn ensure_index(&self, collection: &str, spec: &IndexSpec) -> Result<()> {
        let mut guard = self.collections.write().await;
        guard.entry(collection.to_string()).or_default().indexes.push(spec.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn insert_then_find_one_roundtrips() {
        let store = InMemoryStore::new();
        store.insert("tasks", "1", json!({"id": "1", "status": "pending"})).await.unwrap();
        let found = store.find_one("tasks", &Filter::new().eq("status", "pending")).await.unwrap();
        assert_eq!(found.unwrap()["id"], "1");
    }

    #[tokio::test]
    async fn delete_removes_only_matching() {
        let store = InMemoryStore::new();
        store.insert("tasks", "1", json!({"status": "pending"})).await.unwrap();
        store.insert("tasks", "2", json!({"status": "completed"})).await.unwrap();
        let deleted = store.delete("tasks", &Filter::new().eq("status", "completed")).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count("tasks", &Filter::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn find_respects_sort_limit_offset() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store.insert("items", &i.to_string(), json!({"n": i})).await.unwrap();
        }
        let page = store
            .find("items", &Filter::new(), Some(&Sort::desc("n")), Some(2), Some(1))
            .await
            .unwrap();
        let ns: Vec<i64> = page.iter().map(|v| v["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![3, 2]);
    }
}
