//! Index registry
//!
//! Records, per collection, which composite key-sets have a backing secondary
//! index. An index is named by its field names sorted and joined with `+`, so
//! `{b, a}` and `{a, b}` resolve to the same index `a+b`.
//!
//! The registry only grows.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde_json::Value;

use crate::error::{DbError, DbResult};

/// Separator between field names in an index name
pub const INDEX_NAME_SEPARATOR: &str = "+";

/// Requested index: field paths with a direction (`1` or `-1`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSpec {
    fields: Vec<(String, i32)>,
}

impl IndexSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, builder style
    pub fn field(mut self, path: impl Into<String>, direction: i32) -> Self {
        self.fields.push((path.into(), direction));
        self
    }

    /// Parse `{"a": -1, "b.c": 1}`.
    ///
    /// Directions must be `1` or `-1`; the spec must name at least one field.
    pub fn from_json(value: &Value) -> DbResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| DbError::invalid_argument("index spec must be a JSON object"))?;

        let mut spec = Self::new();
        for (path, direction) in object {
            let direction = match direction.as_i64() {
                Some(1) => 1,
                Some(-1) => -1,
                _ => {
                    return Err(DbError::invalid_argument(format!(
                        "index direction for '{}' must be 1 or -1",
                        path
                    )))
                }
            };
            spec = spec.field(path.clone(), direction);
        }

        if spec.is_empty() {
            return Err(DbError::invalid_argument("index spec names no fields"));
        }
        Ok(spec)
    }

    /// Fields with directions in insertion order
    pub fn fields(&self) -> &[(String, i32)] {
        &self.fields
    }

    /// Field paths sorted ascending, duplicates removed
    pub fn sorted_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.fields.iter().map(|(p, _)| p.clone()).collect();
        paths.sort();
        paths.dedup();
        paths
    }

    /// Derived index name
    pub fn name(&self) -> String {
        index_name(self.fields.iter().map(|(p, _)| p.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Derive an index name from a set of field names
pub fn index_name<'a>(fields: impl IntoIterator<Item = &'a str>) -> String {
    let mut names: Vec<&str> = fields.into_iter().collect();
    names.sort_unstable();
    names.dedup();
    names.join(INDEX_NAME_SEPARATOR)
}

/// Thread-safe per-collection index registry
#[derive(Debug, Default)]
pub struct IndexRegistry {
    // collection -> index name -> sorted field paths
    indexes: RwLock<HashMap<String, BTreeMap<String, Vec<String>>>>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an index for a collection and return its name.
    ///
    /// Registering the same key-set twice is a no-op.
    pub fn register(&self, collection: &str, spec: &IndexSpec) -> String {
        let name = spec.name();
        let mut indexes = match self.indexes.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        indexes
            .entry(collection.to_string())
            .or_default()
            .entry(name.clone())
            .or_insert_with(|| spec.sorted_paths());
        name
    }

    /// Returns true if `name` is registered for `collection`
    pub fn contains(&self, collection: &str, name: &str) -> bool {
        self.lookup(collection, name).is_some()
    }

    /// Sorted field paths of a registered index
    pub fn lookup(&self, collection: &str, name: &str) -> Option<Vec<String>> {
        let indexes = match self.indexes.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        indexes.get(collection)?.get(name).cloned()
    }

    /// Registered index names for a collection, sorted
    pub fn names(&self, collection: &str) -> Vec<String> {
        let indexes = match self.indexes.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        indexes
            .get(collection)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }
}
