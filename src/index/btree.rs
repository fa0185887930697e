//! BTreeMap-based composite index structures
//!
//! Indexes use BTreeMap<CompositeKey, Vec<RecordId>> for deterministic
//! ordering. Record ids per key are kept sorted ascending.

use std::collections::BTreeMap;

use serde_json::Value;

/// Index key representing a single serialized field value.
///
/// Supports Bool, Number (f64 bits for total ordering), String.
/// Ordering is deterministic: Bool < Number < String.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    /// Boolean value (false < true)
    Bool(bool),
    /// Numeric value, integers and floats share one ordering
    Number(u64),
    /// String value
    String(String),
}

impl IndexKey {
    pub fn from_bool(v: bool) -> Self {
        IndexKey::Bool(v)
    }

    /// Create a key from a number.
    ///
    /// Uses bit representation for total ordering, so `1` and `1.0` are the
    /// same key.
    pub fn from_number(v: f64) -> Self {
        // -0.0 and 0.0 compare equal as numbers
        let v = if v == 0.0 { 0.0 } else { v };
        let bits = v.to_bits();
        let ordered = if (bits >> 63) == 1 {
            !bits // Negative: flip all bits
        } else {
            bits ^ (1 << 63) // Positive: flip sign bit
        };
        IndexKey::Number(ordered)
    }

    pub fn from_string(v: impl Into<String>) -> Self {
        IndexKey::String(v.into())
    }

    /// Create a key from a JSON value
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(IndexKey::from_bool(*b)),
            Value::Number(n) => n.as_f64().map(IndexKey::from_number),
            Value::String(s) => Some(IndexKey::from_string(s.as_str())),
            _ => None, // Null, arrays and objects not indexed
        }
    }

    /// Create a composite key; `None` if any component is not indexable
    pub fn composite<'a>(values: impl IntoIterator<Item = &'a Value>) -> Option<CompositeKey> {
        values.into_iter().map(IndexKey::from_json).collect()
    }
}

/// Ordered tuple of field keys
pub type CompositeKey = Vec<IndexKey>;

/// Primary key of an indexed record
pub type RecordId = String;

/// A composite index using BTreeMap for deterministic ordering.
#[derive(Debug, Default, Clone)]
pub struct IndexTree {
    tree: BTreeMap<CompositeKey, Vec<RecordId>>,
}

impl IndexTree {
    pub fn new() -> Self {
        Self {
            tree: BTreeMap::new(),
        }
    }

    /// Insert a record id for a key.
    ///
    /// Maintains sorted ascending order.
    pub fn insert(&mut self, key: CompositeKey, id: RecordId) {
        let ids = self.tree.entry(key).or_default();

        match ids.binary_search(&id) {
            Ok(_) => {} // Already exists
            Err(pos) => ids.insert(pos, id),
        }
    }

    /// Remove a record id for a key.
    ///
    /// If the key has no more ids, removes the key entirely.
    pub fn remove(&mut self, key: &CompositeKey, id: &str) {
        if let Some(ids) = self.tree.get_mut(key) {
            if let Ok(pos) = ids.binary_search_by(|existing| existing.as_str().cmp(id)) {
                ids.remove(pos);
            }
            if ids.is_empty() {
                self.tree.remove(key);
            }
        }
    }

    /// Lookup all record ids for an exact key match, sorted ascending.
    pub fn lookup_eq(&self, key: &CompositeKey) -> Vec<RecordId> {
        self.tree.get(key).cloned().unwrap_or_default()
    }

    /// All (key, id) pairs in key order
    pub fn entries(&self) -> impl Iterator<Item = (&CompositeKey, &RecordId)> {
        self.tree
            .iter()
            .flat_map(|(key, ids)| ids.iter().map(move |id| (key, id)))
    }

    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// Returns the number of distinct keys
    pub fn key_count(&self) -> usize {
        self.tree.len()
    }

    /// Returns the total number of indexed records
    pub fn record_count(&self) -> usize {
        self.tree.values().map(|v| v.len()).sum()
    }
}
