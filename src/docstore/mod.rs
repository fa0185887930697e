//! Document store backend
//!
//! An in-process document engine whose native query language is a filter
//! document pipeline, and the adapter that compiles the query algebra into
//! it. The engine's native identity key is `_id`, so records need no key
//! swap on the way in or out.

mod adapter;
mod compiler;
mod engine;
mod errors;
mod eval;

pub use adapter::DocStoreAdapter;
pub use compiler::{compile, filter_document};
pub use engine::{DocClient, DocCollection, DocCursor, DocServer, Stage, ID_KEY};
pub use errors::{DocStoreError, DocStoreResult};
pub use eval::matches;
