//! Backend adapter contract
//!
//! An adapter compiles a [`Query`] into the native query language of one
//! storage engine and runs CRUD and aggregate operations against it. Every
//! adapter owns one shared connection and guarantees that a collection is
//! provisioned before it is touched.
//!
//! # Contract
//!
//! - Reads return [`FetchedRecord`]s; the native identity key never leaks
//! - Misses on `find_by_id` and `find_one` are `None`, not errors
//! - `remove_by_id` of a missing id is a no-op
//! - A collection never passed to `ensure_collection` fails with
//!   `NotRegistered`
//! - Transport failures surface as `BackendUnavailable`

mod provision;

pub use provision::{Provisioner, SharedConnection};

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;

use crate::document::Document;
use crate::error::DbResult;
use crate::identity::FetchedRecord;
use crate::index::IndexSpec;
use crate::query::Query;

/// Boxed future returned by adapter operations
pub type AdapterFuture<'a, T> = Pin<Box<dyn Future<Output = DbResult<T>> + Send + 'a>>;

/// Storage backend adapter
pub trait Adapter: Send + Sync {
    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;

    /// Create the collection if needed.
    ///
    /// Concurrent calls for the same collection issue one create request.
    fn ensure_collection<'a>(&'a self, collection: &'a str) -> AdapterFuture<'a, ()>;

    /// Create a secondary index; creating an existing index is a no-op
    fn create_index<'a>(
        &'a self,
        collection: &'a str,
        name: &'a str,
        spec: &'a IndexSpec,
    ) -> AdapterFuture<'a, ()>;

    /// Insert a record and return its generated id
    fn insert<'a>(&'a self, collection: &'a str, object: Document) -> AdapterFuture<'a, String>;

    fn find_by_id<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
    ) -> AdapterFuture<'a, Option<FetchedRecord>>;

    fn find<'a>(&'a self, collection: &'a str, query: &'a Query)
        -> AdapterFuture<'a, Vec<FetchedRecord>>;

    fn find_one<'a>(
        &'a self,
        collection: &'a str,
        query: &'a Query,
    ) -> AdapterFuture<'a, Option<FetchedRecord>>;

    fn count<'a>(&'a self, collection: &'a str, query: &'a Query) -> AdapterFuture<'a, u64>;

    /// Sum a numeric field over the matching records
    fn sum<'a>(
        &'a self,
        collection: &'a str,
        query: &'a Query,
        field: &'a str,
    ) -> AdapterFuture<'a, f64>;

    fn remove_by_id<'a>(&'a self, collection: &'a str, id: &'a str) -> AdapterFuture<'a, ()>;

    /// Remove matching records, returning how many were removed
    fn remove<'a>(&'a self, collection: &'a str, query: &'a Query) -> AdapterFuture<'a, u64>;

    /// Replace a whole record, keeping its id
    fn replace_by_id<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        object: Document,
    ) -> AdapterFuture<'a, ()>;

    /// Partial update.
    ///
    /// For each top-level key named by `updated_paths`, the value in
    /// `object` is written, or the key is removed when `object` lacks it.
    fn update_by_id<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        object: Document,
        updated_paths: &'a BTreeSet<String>,
    ) -> AdapterFuture<'a, ()>;
}

/// Split tracked paths into top-level keys to set and keys to remove
pub fn partial_update(
    object: &Document,
    updated_paths: &BTreeSet<String>,
) -> (Document, Vec<String>) {
    let mut set = Document::new();
    let mut unset = Vec::new();

    let tops: BTreeSet<&str> = updated_paths
        .iter()
        .map(|p| crate::document::top_level(p))
        .collect();

    for key in tops {
        match object.get(key) {
            Some(value) => {
                set.insert(key.to_string(), value.clone());
            }
            None => unset.push(key.to_string()),
        }
    }
    (set, unset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_partial_update_split() {
        let object = json!({"a": {"b": 2}, "c": 1, "untouched": true});
        let object = object.as_object().cloned().unwrap();
        let paths: BTreeSet<String> = ["a.b", "a.c", "d"].iter().map(|s| s.to_string()).collect();

        let (set, unset) = partial_update(&object, &paths);
        assert_eq!(Value::Object(set), json!({"a": {"b": 2}}));
        assert_eq!(unset, vec!["d"]);
    }
}
