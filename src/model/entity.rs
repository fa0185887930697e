//! Model handle
//!
//! A model is cheap to clone; clones share the binding, so a model handed
//! out before registration sees the adapter once it is registered.

use std::sync::{Arc, OnceLock};

use serde_json::Value;

use super::record::Record;
use crate::adapter::Adapter;
use crate::document::Document;
use crate::error::{DbError, DbResult};
use crate::index::IndexSpec;
use crate::query::{MatchObject, QueryBuilder};

struct ModelInner {
    collection: String,
    adapter: OnceLock<Arc<dyn Adapter>>,
}

/// Entity class bound to one collection
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

impl Model {
    /// Create an unbound model for `collection`
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ModelInner {
                collection: collection.into(),
                adapter: OnceLock::new(),
            }),
        }
    }

    pub fn collection(&self) -> &str {
        &self.inner.collection
    }

    /// Returns true once registered with a database
    pub fn is_bound(&self) -> bool {
        self.inner.adapter.get().is_some()
    }

    pub(super) fn bind(&self, adapter: Arc<dyn Adapter>) -> DbResult<()> {
        let bound = self.inner.adapter.get_or_init(|| Arc::clone(&adapter));
        if same_adapter(bound, &adapter) {
            Ok(())
        } else {
            Err(DbError::invalid_argument(format!(
                "model {} is already bound to another database",
                self.inner.collection
            )))
        }
    }

    fn adapter(&self) -> DbResult<&Arc<dyn Adapter>> {
        self.inner
            .adapter
            .get()
            .ok_or_else(|| DbError::not_registered(format!("model {}", self.inner.collection)))
    }

    /// Start a query over this model's collection
    pub fn query(&self) -> DbResult<QueryBuilder> {
        let adapter = self.adapter()?;
        Ok(QueryBuilder::new(Arc::clone(adapter), self.collection()))
    }

    /// Query filtered by a JSON match object; `null` matches everything
    fn filtered(&self, filter: Value) -> DbResult<QueryBuilder> {
        let object = MatchObject::from_json(filter)?;
        let query = self.query()?;
        if object.is_empty() {
            Ok(query)
        } else {
            Ok(query.filter(object))
        }
    }

    /// New unsaved record with `data`
    pub fn record(&self, data: Document) -> DbResult<Record> {
        let adapter = self.adapter()?;
        Ok(Record::new(Arc::clone(adapter), self.collection(), data))
    }

    pub async fn find_by_id(&self, id: &str) -> DbResult<Option<Record>> {
        let adapter = self.adapter()?;
        let fetched = adapter.find_by_id(self.collection(), id).await?;
        Ok(fetched.map(|f| Record::fetched(Arc::clone(adapter), self.collection(), f)))
    }

    pub async fn find(&self, filter: Value) -> DbResult<Vec<Record>> {
        let adapter = self.adapter()?;
        let fetched = self.filtered(filter)?.find().await?;
        Ok(fetched
            .into_iter()
            .map(|f| Record::fetched(Arc::clone(adapter), self.collection(), f))
            .collect())
    }

    pub async fn find_one(&self, filter: Value) -> DbResult<Option<Record>> {
        let adapter = self.adapter()?;
        let fetched = self.filtered(filter)?.find_one().await?;
        Ok(fetched.map(|f| Record::fetched(Arc::clone(adapter), self.collection(), f)))
    }

    pub async fn count(&self, filter: Value) -> DbResult<u64> {
        self.filtered(filter)?.count().await
    }

    /// Sum `field` over the records matching `filter`
    pub async fn sum(&self, field: &str, filter: Value) -> DbResult<f64> {
        self.filtered(filter)?.sum(field).await
    }

    /// Remove matching records, returning how many were removed
    pub async fn remove(&self, filter: Value) -> DbResult<u64> {
        self.filtered(filter)?.remove().await
    }

    pub async fn create_index(&self, name: &str, spec: &IndexSpec) -> DbResult<()> {
        let adapter = self.adapter()?;
        adapter.create_index(self.collection(), name, spec).await
    }
}

fn same_adapter(a: &Arc<dyn Adapter>, b: &Arc<dyn Adapter>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("collection", &self.inner.collection)
            .field(
                "backend",
                &self.inner.adapter.get().map(|a| a.backend_name()),
            )
            .finish()
    }
}
