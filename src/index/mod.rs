//! Secondary index support
//!
//! # Design Principles
//!
//! - Derived state: indexes mirror table contents, never the source of truth
//! - Deterministic: BTreeMap iteration order, sorted record ids
//! - Composite: an index covers an ordered list of dotted field paths

mod btree;
mod registry;

pub use btree::{CompositeKey, IndexKey, IndexTree, RecordId};
pub use registry::{index_name, IndexRegistry, IndexSpec, INDEX_NAME_SEPARATOR};
