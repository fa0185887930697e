//! plugdb - backend-agnostic persistence with a pluggable query compiler
//!
//! Application code builds queries against an abstract data model; an
//! [`Adapter`] compiles them into the native query language of a storage
//! engine. Two engines ship in-process:
//!
//! - [`docstore`]: filter documents with dotted paths and native regex
//! - [`tablestore`]: predicate terms with secondary composite indexes

pub mod adapter;
pub mod config;
pub mod docstore;
pub mod document;
pub mod error;
pub mod identity;
pub mod index;
pub mod model;
pub mod observability;
pub mod query;
pub mod tablestore;

pub use adapter::Adapter;
pub use config::{DocStoreConfig, TableStoreConfig};
pub use docstore::{DocServer, DocStoreAdapter};
pub use document::Document;
pub use error::{DbError, DbResult};
pub use identity::FetchedRecord;
pub use index::{IndexRegistry, IndexSpec};
pub use model::{Db, Model, Record};
pub use query::{ElementMatcher, MatchObject, Matcher, Pattern, Query, QueryBuilder};
pub use tablestore::{TableServer, TableStoreAdapter};
