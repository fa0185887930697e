//! Table store backend
//!
//! An in-process table engine whose native query language is a predicate
//! term tree with secondary composite indexes, and the adapter that compiles
//! the query algebra into it.
//!
//! The engine's primary key is `id`; the adapter swaps it with the logical
//! `_id` on the way in and out.

mod adapter;
mod compiler;
mod engine;
mod errors;
mod term;

pub use adapter::TableStoreAdapter;
pub use compiler::{compile, native_path, row_path, CompiledSelection};
pub use engine::{
    InsertResult, OrderKey, Selection, SelectionStage, Source, Table, TableConnection,
    TableServer, PRIMARY_KEY,
};
pub use errors::{TableStoreError, TableStoreResult};
pub use term::{EvalError, Func, Term};
