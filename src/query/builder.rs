//! Fluent query builder
//!
//! Each builder method appends one operation and returns the builder.
//! Terminal operations borrow the builder, so a built query can be run
//! any number of times.

use std::sync::Arc;

use serde_json::Value;

use super::matcher::{MatchObject, Matcher, Pattern};
use super::operation::{ElementMatcher, Query, QueryOperation, SortDirection};
use crate::adapter::Adapter;
use crate::error::DbResult;
use crate::identity::FetchedRecord;

/// Query under construction for one collection
#[derive(Clone)]
pub struct QueryBuilder {
    collection: String,
    query: Query,
    adapter: Arc<dyn Adapter>,
}

impl QueryBuilder {
    /// Start an empty query (matches every record)
    pub fn new(adapter: Arc<dyn Adapter>, collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            query: Query::new(),
            adapter,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Operations accumulated so far
    pub fn query(&self) -> &Query {
        &self.query
    }

    fn push(mut self, op: QueryOperation) -> Self {
        self.query.push(op);
        self
    }

    /// Field equals a value (or matches a nested object / pattern)
    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Matcher>) -> Self {
        self.push(QueryOperation::Equals {
            field: field.into(),
            value: value.into(),
        })
    }

    /// Every field of `object` matches
    pub fn filter(self, object: MatchObject) -> Self {
        self.push(QueryOperation::Filter { object })
    }

    /// String field matches a regular expression
    pub fn match_pattern(self, field: impl Into<String>, pattern: Pattern) -> Self {
        self.push(QueryOperation::Equals {
            field: field.into(),
            value: Matcher::Pattern(pattern),
        })
    }

    /// Array field has an element equal to `value`, or satisfying it when
    /// `value` is an object
    pub fn elem(self, field: impl Into<String>, value: impl Into<ElementMatcher>) -> Self {
        self.push(QueryOperation::ElementMatch {
            field: field.into(),
            matcher: value.into(),
        })
    }

    pub fn ne(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(QueryOperation::NotEquals {
            field: field.into(),
            value: value.into(),
        })
    }

    pub fn not_in(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.push(QueryOperation::NotIn {
            field: field.into(),
            values,
        })
    }

    pub fn is_in(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.push(QueryOperation::In {
            field: field.into(),
            values,
        })
    }

    /// At least one of `matches` holds
    pub fn or(self, matches: impl IntoIterator<Item = MatchObject>) -> Self {
        self.push(QueryOperation::Or {
            matches: matches.into_iter().collect(),
        })
    }

    /// All of `matches` hold
    pub fn and(self, matches: impl IntoIterator<Item = MatchObject>) -> Self {
        self.push(QueryOperation::And {
            matches: matches.into_iter().collect(),
        })
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(QueryOperation::GreaterThan {
            field: field.into(),
            value: value.into(),
        })
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(QueryOperation::LessThan {
            field: field.into(),
            value: value.into(),
        })
    }

    pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(QueryOperation::GreaterOrEqual {
            field: field.into(),
            value: value.into(),
        })
    }

    pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(QueryOperation::LessOrEqual {
            field: field.into(),
            value: value.into(),
        })
    }

    pub fn limit(self, count: u64) -> Self {
        self.push(QueryOperation::Limit { count })
    }

    pub fn skip(self, count: u64) -> Self {
        self.push(QueryOperation::Skip { count })
    }

    /// Sort by a field.
    ///
    /// Fails with `InvalidArgument` on an unrecognized direction.
    pub fn sort(self, field: impl Into<String>, direction: impl Into<Value>) -> DbResult<Self> {
        let direction = SortDirection::parse(&direction.into())?;
        Ok(self.push(QueryOperation::Sort {
            field: field.into(),
            direction,
        }))
    }

    /// Sort by a field, descending
    pub fn sort_by(self, field: impl Into<String>) -> Self {
        self.push(QueryOperation::Sort {
            field: field.into(),
            direction: SortDirection::Desc,
        })
    }

    // =========================================================================
    // Terminal operations
    // =========================================================================

    pub async fn find(&self) -> DbResult<Vec<FetchedRecord>> {
        self.adapter.find(&self.collection, &self.query).await
    }

    pub async fn find_one(&self) -> DbResult<Option<FetchedRecord>> {
        self.adapter.find_one(&self.collection, &self.query).await
    }

    pub async fn count(&self) -> DbResult<u64> {
        self.adapter.count(&self.collection, &self.query).await
    }

    pub async fn sum(&self, field: &str) -> DbResult<f64> {
        self.adapter.sum(&self.collection, &self.query, field).await
    }

    /// Remove matching records, returning how many were removed
    pub async fn remove(&self) -> DbResult<u64> {
        self.adapter.remove(&self.collection, &self.query).await
    }
}

impl std::fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("collection", &self.collection)
            .field("backend", &self.adapter.backend_name())
            .field("query", &self.query)
            .finish()
    }
}
