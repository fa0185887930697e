//! Record identity convention
//!
//! Callers address a record's identity as `_id`. Each engine stores it under
//! its own native primary key; when the two names differ they are swapped on
//! the way out and on the way back in, so a user field named like the native
//! key never collides with the identity.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Document;

/// Logical identity key exposed to callers and accepted in queries
pub const LOGICAL_ID: &str = "_id";

/// Canonical shape returned by every read operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedRecord {
    /// Backend-generated identity
    pub id: String,
    /// Record body without any identity key
    pub object: Document,
}

/// Swap two keys in a shallow copy of `object`.
///
/// Absent keys are left untouched: a present `key1` moves to `key2` and
/// vice versa.
pub fn swap_keys(key1: &str, key2: &str, object: &Document) -> Document {
    let mut swapped = object.clone();
    let val1 = swapped.remove(key1);
    let val2 = swapped.remove(key2);

    if let Some(v) = val1 {
        swapped.insert(key2.to_string(), v);
    }
    if let Some(v) = val2 {
        swapped.insert(key1.to_string(), v);
    }
    swapped
}

/// Prepare a caller object for an engine whose primary key is `native_key`
pub fn outbound(native_key: &str, object: &Document) -> Document {
    if native_key == LOGICAL_ID {
        object.clone()
    } else {
        swap_keys(native_key, LOGICAL_ID, object)
    }
}

/// Convert a raw engine record into a `FetchedRecord`.
///
/// Returns `None` if the record carries no identity.
pub fn inbound(native_key: &str, raw: Document) -> Option<FetchedRecord> {
    let mut object = if native_key == LOGICAL_ID {
        raw
    } else {
        swap_keys(native_key, LOGICAL_ID, &raw)
    };

    let id = match object.remove(LOGICAL_ID)? {
        Value::String(s) => s,
        other => other.to_string(),
    };

    Some(FetchedRecord { id, object })
}
