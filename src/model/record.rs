//! Model instances with tracked mutations

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{Number, Value};

use crate::adapter::Adapter;
use crate::document::{get_path, remove_path, set_path, Document};
use crate::error::{DbError, DbResult};
use crate::identity::FetchedRecord;

/// One record of a model.
///
/// A record without an id has not been saved yet. Every mutation records
/// its path; `save` on a stored record sends only those paths.
#[derive(Clone)]
pub struct Record {
    adapter: Arc<dyn Adapter>,
    collection: String,
    id: Option<String>,
    data: Document,
    updated: BTreeSet<String>,
}

impl Record {
    pub(super) fn new(adapter: Arc<dyn Adapter>, collection: &str, data: Document) -> Self {
        Self {
            adapter,
            collection: collection.to_string(),
            id: None,
            data,
            updated: BTreeSet::new(),
        }
    }

    pub(super) fn fetched(adapter: Arc<dyn Adapter>, collection: &str, fetched: FetchedRecord) -> Self {
        Self {
            adapter,
            collection: collection.to_string(),
            id: Some(fetched.id),
            data: fetched.object,
            updated: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn data(&self) -> &Document {
        &self.data
    }

    /// Value at a dotted path
    pub fn get(&self, path: &str) -> Option<&Value> {
        get_path(&self.data, path)
    }

    /// Paths mutated since the last save, replace or refresh
    pub fn updated_paths(&self) -> &BTreeSet<String> {
        &self.updated
    }

    pub fn is_dirty(&self) -> bool {
        !self.updated.is_empty()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> &mut Self {
        set_path(&mut self.data, path, value.into());
        self.updated.insert(path.to_string());
        self
    }

    /// Set every top-level key of `values`
    pub fn set_all(&mut self, values: Document) -> &mut Self {
        for (key, value) in values {
            self.set(&key, value);
        }
        self
    }

    pub fn unset(&mut self, path: &str) -> &mut Self {
        remove_path(&mut self.data, path);
        self.updated.insert(path.to_string());
        self
    }

    /// Add `by` to a numeric field. A missing field counts as zero.
    pub fn increment(&mut self, path: &str, by: impl Into<Number>) -> DbResult<&mut Self> {
        let sum = add(self.get(path), &by.into(), false, path)?;
        Ok(self.set(path, sum))
    }

    /// Subtract `by` from a numeric field. A missing field counts as zero.
    pub fn decrement(&mut self, path: &str, by: impl Into<Number>) -> DbResult<&mut Self> {
        let diff = add(self.get(path), &by.into(), true, path)?;
        Ok(self.set(path, diff))
    }

    /// Append to an array field, creating it when missing
    pub fn push(&mut self, path: &str, value: impl Into<Value>) -> DbResult<&mut Self> {
        let items = match self.get(path) {
            None | Some(Value::Null) => vec![value.into()],
            Some(Value::Array(items)) => {
                let mut items = items.clone();
                items.push(value.into());
                items
            }
            Some(other) => {
                return Err(DbError::invalid_argument(format!(
                    "cannot push to {}: not an array ({})",
                    path, other
                )))
            }
        };
        Ok(self.set(path, Value::Array(items)))
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    fn require_id(&self) -> DbResult<&str> {
        self.id
            .as_deref()
            .ok_or_else(|| DbError::not_found(format!("unsaved record in {}", self.collection)))
    }

    /// Insert when unsaved, otherwise write the tracked paths
    pub async fn save(&mut self) -> DbResult<()> {
        match self.id.clone() {
            None => {
                let id = self
                    .adapter
                    .insert(&self.collection, self.data.clone())
                    .await?;
                self.id = Some(id);
            }
            Some(_) if self.updated.is_empty() => {}
            Some(id) => {
                self.adapter
                    .update_by_id(&self.collection, &id, self.data.clone(), &self.updated)
                    .await?;
            }
        }
        self.updated.clear();
        Ok(())
    }

    /// Overwrite the stored record with this record's data
    pub async fn replace(&mut self) -> DbResult<()> {
        let id = self.require_id()?;
        self.adapter
            .replace_by_id(&self.collection, id, self.data.clone())
            .await?;
        self.updated.clear();
        Ok(())
    }

    /// Delete the stored record. The id is kept; a later `refresh` fails.
    pub async fn remove(&self) -> DbResult<()> {
        let id = self.require_id()?;
        self.adapter.remove_by_id(&self.collection, id).await
    }

    /// Reload the stored data, discarding local changes
    pub async fn refresh(&mut self) -> DbResult<()> {
        let id = self.require_id()?;
        let fetched = self
            .adapter
            .find_by_id(&self.collection, id)
            .await?
            .ok_or_else(|| DbError::not_found(format!("{} in {}", id, self.collection)))?;

        self.data = fetched.object;
        self.updated.clear();
        Ok(())
    }
}

fn add(current: Option<&Value>, by: &Number, negate: bool, path: &str) -> DbResult<Value> {
    let current = match current {
        None | Some(Value::Null) => Number::from(0),
        Some(Value::Number(n)) => n.clone(),
        Some(other) => {
            return Err(DbError::invalid_argument(format!(
                "cannot add to {}: not a number ({})",
                path, other
            )))
        }
    };

    if let (Some(a), Some(b)) = (current.as_i64(), by.as_i64()) {
        let b = if negate { b.checked_neg() } else { Some(b) };
        if let Some(sum) = b.and_then(|b| a.checked_add(b)) {
            return Ok(Value::from(sum));
        }
    }

    let a = current.as_f64().unwrap_or(0.0);
    let b = by.as_f64().unwrap_or(0.0);
    let sum = if negate { a - b } else { a + b };
    Number::from_f64(sum)
        .map(Value::Number)
        .ok_or_else(|| DbError::invalid_argument(format!("{} is not a finite number", path)))
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("collection", &self.collection)
            .field("id", &self.id)
            .field("data", &self.data)
            .field("updated", &self.updated)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DocStoreConfig, TableStoreConfig};
    use crate::docstore::{DocServer, DocStoreAdapter};
    use crate::model::{Db, Model};
    use crate::tablestore::{TableServer, TableStoreAdapter};
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    async fn models() -> Vec<Model> {
        let dbs = [
            Db::new(Arc::new(DocStoreAdapter::new(
                &DocServer::new(),
                DocStoreConfig::default(),
            ))),
            Db::new(Arc::new(TableStoreAdapter::new(
                &TableServer::new(),
                TableStoreConfig::default(),
            ))),
        ];

        let mut models = Vec::new();
        for db in dbs {
            let model = Model::new("people");
            db.register(&model).await.unwrap();
            models.push(model);
        }
        models
    }

    // =========================================================================
    // Local mutations
    // =========================================================================

    #[tokio::test]
    async fn test_mutations_track_paths() {
        let models = models().await;
        let model = &models[0];
        let mut record = model.record(doc(json!({"name": "ann"}))).unwrap();

        record.set("address.city", "Oslo").unset("name");
        assert_eq!(record.get("address.city"), Some(&json!("Oslo")));
        assert_eq!(record.get("name"), None);

        let paths: Vec<&str> = record.updated_paths().iter().map(String::as_str).collect();
        assert_eq!(paths, vec!["address.city", "name"]);
    }

    #[tokio::test]
    async fn test_increment_decrement() {
        let models = models().await;
        let model = &models[0];
        let mut record = model.record(doc(json!({"n": 5, "f": 1.5}))).unwrap();

        record.increment("n", 2).unwrap();
        record.decrement("n", 10).unwrap();
        record.increment("missing", 3).unwrap();
        record.increment("f", 1).unwrap();

        assert_eq!(record.get("n"), Some(&json!(-3)));
        assert_eq!(record.get("missing"), Some(&json!(3)));
        assert_eq!(record.get("f"), Some(&json!(2.5)));

        record.set("s", "text");
        let err = record.increment("s", 1).unwrap_err();
        assert!(matches!(err, DbError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_push() {
        let models = models().await;
        let model = &models[0];
        let mut record = model.record(doc(json!({"tags": ["a"], "n": 1}))).unwrap();

        record.push("tags", "b").unwrap();
        record.push("fresh", 1).unwrap();
        assert_eq!(record.get("tags"), Some(&json!(["a", "b"])));
        assert_eq!(record.get("fresh"), Some(&json!([1])));

        let err = record.push("n", 2).unwrap_err();
        assert!(matches!(err, DbError::InvalidArgument(_)));
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    #[tokio::test]
    async fn test_save_inserts_then_updates() {
        for model in models().await {
            let mut record = model.record(doc(json!({"name": "ann", "age": 30}))).unwrap();
            record.save().await.unwrap();
            let id = record.id().unwrap().to_string();
            assert!(!record.is_dirty());

            record.set("age", 31).set("city", "Oslo");
            record.save().await.unwrap();

            let stored = model.find_by_id(&id).await.unwrap().unwrap();
            assert_eq!(
                Value::Object(stored.data().clone()),
                json!({"name": "ann", "age": 31, "city": "Oslo"})
            );
        }
    }

    #[tokio::test]
    async fn test_save_only_sends_tracked_paths() {
        for model in models().await {
            let mut first = model.record(doc(json!({"a": 1, "b": 1}))).unwrap();
            first.save().await.unwrap();
            let id = first.id().unwrap().to_string();

            let mut second = model.find_by_id(&id).await.unwrap().unwrap();
            second.set("b", 2);
            second.save().await.unwrap();

            first.set("a", 2);
            first.save().await.unwrap();

            first.refresh().await.unwrap();
            assert_eq!(Value::Object(first.data().clone()), json!({"a": 2, "b": 2}));
        }
    }

    #[tokio::test]
    async fn test_unset_persists() {
        for model in models().await {
            let mut record = model.record(doc(json!({"a": 1, "b": 2}))).unwrap();
            record.save().await.unwrap();

            record.unset("b");
            record.save().await.unwrap();
            record.refresh().await.unwrap();

            assert_eq!(Value::Object(record.data().clone()), json!({"a": 1}));
        }
    }

    #[tokio::test]
    async fn test_replace() {
        for model in models().await {
            let mut record = model.record(doc(json!({"a": 1, "b": 2}))).unwrap();
            record.save().await.unwrap();

            let mut copy = record.clone();
            copy.unset("a").unset("b").set("c", 3);
            copy.replace().await.unwrap();

            record.refresh().await.unwrap();
            assert_eq!(Value::Object(record.data().clone()), json!({"c": 3}));
        }
    }

    #[tokio::test]
    async fn test_unsaved_record_needs_id() {
        let models = models().await;
        let model = &models[1];
        let mut record = model.record(doc(json!({"a": 1}))).unwrap();

        assert!(matches!(record.refresh().await, Err(DbError::NotFound(_))));
        assert!(matches!(record.replace().await, Err(DbError::NotFound(_))));
        assert!(matches!(record.remove().await, Err(DbError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_refresh_after_remove() {
        for model in models().await {
            let mut record = model.record(doc(json!({"a": 1}))).unwrap();
            record.save().await.unwrap();
            record.remove().await.unwrap();

            assert!(matches!(record.refresh().await, Err(DbError::NotFound(_))));
            assert_eq!(model.count(Value::Null).await.unwrap(), 0);
        }
    }
}
