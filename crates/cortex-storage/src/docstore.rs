//! The `DocStore` collaborator interface (spec §6.1): typed document
//! persistence for tasks, knowledge entries, and index metadata.
//!
//! `DocStore` itself is an object-safe trait operating on `serde_json::Value`
//! documents so it can be held as `Arc<dyn DocStore>`; `Collection<T>` is a
//! thin generic wrapper giving callers the typed `Collection[T]` surface the
//! spec describes, mirroring the teacher's split between a dynamic storage
//! backend and typed call sites.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use cortex_core::error::{CortexError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::filter::{Filter, IndexSpec, Sort};

#[async_trait]
pub trait DocStore: Send + Sync {
    async fn insert(&self, collection: &str, id: &str, doc: Value) -> Result<()>;

    /// Returns the number of documents updated.
    async fn update(&self, collection: &str, filter: &Filter, patch: Value) -> Result<u64>;

    /// Returns the number of documents deleted.
    async fn delete(&self, collection: &str, filter: &Filter) -> Result<u64>;

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Value>>;

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>>;

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64>;

    async fn ensure_index(&self, collection: &str, spec: &IndexSpec) -> Result<()>;
}

/// A typed view over one named collection backed by a `DocStore`.
#[derive(Clone)]
pub struct Collection<T> {
    store: Arc<dyn DocStore>,
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(store: Arc<dyn DocStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn insert(&self, id: &str, value: &T) -> Result<()> {
        let doc = serde_json::to_value(value)?;
        self.store.insert(&self.name, id, doc).await
    }

    pub async fn update(&self, filter: &Filter, patch: Value) -> Result<u64> {
        self.store.update(&self.name, filter, patch).await
    }

    pub async fn delete(&self, filter: &Filter) -> Result<u64> {
        self.store.delete(&self.name, filter).await
    }

    pub async fn find(
        &self,
        filter: &Filter,
        sort: Option<&Sort>,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<T>> {
        let docs = self.store.find(&self.name, filter, sort, limit, offset).await?;
        docs.into_iter()
            .map(|d| serde_json::from_value(d).map_err(CortexError::from))
            .collect()
    }

    pub async fn find_one(&self, filter: &Filter) -> Result<Option<T>> {
        match self.store.find_one(&self.name, filter).await? {
            Some(d) => Ok(Some(serde_json::from_value(d)?)),
            None => Ok(None),
        }
    }

    pub async fn count(&self, filter: &Filter) -> Result<u64> {
        self.store.count(&self.name, filter).await
    }

    pub async fn ensure_index(&self, spec: &IndexSpec) -> Result<()> {
        self.store.ensure_index(&self.name, spec).await
    }
}
