//! Query algebra
//!
//! Ordered, composable operations over a collection, independent of any
//! storage engine. Each backend compiles a [`Query`] into its own native
//! form.
//!
//! # Example
//!
//! ```ignore
//! let adults = model
//!     .query()?
//!     .gte("age", 18)
//!     .ne("status", "banned")
//!     .sort("age", "asc")?
//!     .limit(10)
//!     .find()
//!     .await?;
//! ```

mod builder;
mod matcher;
mod operation;

pub use builder::QueryBuilder;
pub use matcher::{split_patterns, FlatMatch, Leaf, MatchObject, Matcher, Pattern};
pub use operation::{fold_negations, ElementMatcher, Query, QueryOperation, SortDirection};
