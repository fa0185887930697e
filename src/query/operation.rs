//! Query algebra
//!
//! A query is an ordered list of operations. Compilers match on
//! `QueryOperation` exhaustively, so a new operation must be handled by every
//! backend before the crate builds.

use serde_json::Value;

use super::matcher::{MatchObject, Matcher};
use crate::error::{DbError, DbResult};

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    pub fn is_descending(&self) -> bool {
        matches!(self, SortDirection::Desc)
    }

    /// Parse a caller-supplied direction.
    ///
    /// `1`, `"asc"`, `"ascending"` are ascending; `-1`, `"desc"`,
    /// `"descending"` are descending. Numbers may be given as strings.
    pub fn parse(direction: &Value) -> DbResult<Self> {
        let text = match direction {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            other => {
                return Err(DbError::invalid_argument(format!(
                    "invalid sort direction: {}",
                    other
                )))
            }
        };

        match text.as_str() {
            "1" | "asc" | "ascending" => Ok(SortDirection::Asc),
            "-1" | "desc" | "descending" => Ok(SortDirection::Desc),
            _ => Err(DbError::invalid_argument(format!(
                "invalid sort direction: {}",
                text
            ))),
        }
    }
}

/// What an element of an array field must satisfy
#[derive(Debug, Clone, PartialEq)]
pub enum ElementMatcher {
    /// Element deep-equal to a value
    Value(Value),
    /// Element satisfying a sub-filter
    Object(MatchObject),
}

impl From<Value> for ElementMatcher {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => ElementMatcher::Object(MatchObject::from(map)),
            other => ElementMatcher::Value(other),
        }
    }
}

impl From<MatchObject> for ElementMatcher {
    fn from(object: MatchObject) -> Self {
        ElementMatcher::Object(object)
    }
}

/// A single query operation
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOperation {
    Equals { field: String, value: Matcher },
    Filter { object: MatchObject },
    ElementMatch { field: String, matcher: ElementMatcher },
    NotEquals { field: String, value: Value },
    NotIn { field: String, values: Vec<Value> },
    In { field: String, values: Vec<Value> },
    Or { matches: Vec<MatchObject> },
    And { matches: Vec<MatchObject> },
    GreaterThan { field: String, value: Value },
    LessThan { field: String, value: Value },
    GreaterOrEqual { field: String, value: Value },
    LessOrEqual { field: String, value: Value },
    Limit { count: u64 },
    Skip { count: u64 },
    Sort { field: String, direction: SortDirection },
}

impl QueryOperation {
    /// Operation name for logging
    pub fn op_name(&self) -> &'static str {
        match self {
            QueryOperation::Equals { .. } => "eq",
            QueryOperation::Filter { .. } => "filter",
            QueryOperation::ElementMatch { .. } => "elem",
            QueryOperation::NotEquals { .. } => "ne",
            QueryOperation::NotIn { .. } => "nin",
            QueryOperation::In { .. } => "in",
            QueryOperation::Or { .. } => "or",
            QueryOperation::And { .. } => "and",
            QueryOperation::GreaterThan { .. } => "gt",
            QueryOperation::LessThan { .. } => "lt",
            QueryOperation::GreaterOrEqual { .. } => "gte",
            QueryOperation::LessOrEqual { .. } => "lte",
            QueryOperation::Limit { .. } => "limit",
            QueryOperation::Skip { .. } => "skip",
            QueryOperation::Sort { .. } => "sort",
        }
    }
}

/// Ordered list of query operations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    operations: Vec<QueryOperation>,
}

impl Query {
    /// Creates an empty query (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an operation
    pub fn push(&mut self, op: QueryOperation) {
        self.operations.push(op);
    }

    /// Appends an operation, builder style
    pub fn with(mut self, op: QueryOperation) -> Self {
        self.push(op);
        self
    }

    /// Operations in insertion order
    pub fn operations(&self) -> &[QueryOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Operations with adjacent same-field negations folded
    pub fn folded(&self) -> Vec<QueryOperation> {
        fold_negations(&self.operations)
    }

    /// Short description for logs, e.g. `filter,ne,sort`
    pub fn describe(&self) -> String {
        self.operations
            .iter()
            .map(|op| op.op_name())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl From<Vec<QueryOperation>> for Query {
    fn from(operations: Vec<QueryOperation>) -> Self {
        Self { operations }
    }
}

/// Fold runs of adjacent `NotEquals` on the same field into one `NotIn`.
///
/// A lone `NotEquals` is kept as is. Non-adjacent repeats are not merged.
pub fn fold_negations(ops: &[QueryOperation]) -> Vec<QueryOperation> {
    let mut folded = Vec::with_capacity(ops.len());
    let mut i = 0;

    while i < ops.len() {
        let QueryOperation::NotEquals { field, value } = &ops[i] else {
            folded.push(ops[i].clone());
            i += 1;
            continue;
        };

        let mut values = vec![value.clone()];
        let mut j = i + 1;
        while let Some(QueryOperation::NotEquals {
            field: next_field,
            value: next_value,
        }) = ops.get(j)
        {
            if next_field != field {
                break;
            }
            values.push(next_value.clone());
            j += 1;
        }

        if values.len() == 1 {
            folded.push(ops[i].clone());
        } else {
            folded.push(QueryOperation::NotIn {
                field: field.clone(),
                values,
            });
        }
        i = j;
    }

    folded
}
