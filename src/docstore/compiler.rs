//! Query compilation for the document store
//!
//! Each operation becomes one or more pipeline stages. Filters are flattened
//! to dotted paths; literal leaves are grouped into one equality document
//! and every regex leaf gets its own `Match` stage, so all of them must hold.

use serde_json::{json, Value};

use super::engine::Stage;
use crate::document::Document;
use crate::query::{
    split_patterns, ElementMatcher, MatchObject, Pattern, Query, QueryOperation,
};

fn regex_condition(pattern: &Pattern) -> Value {
    json!({"$regex": pattern.source(), "$options": pattern.flags()})
}

fn single(field: &str, condition: Value) -> Document {
    let mut doc = Document::new();
    doc.insert(field.to_string(), condition);
    doc
}

/// Stages for a match object: one equality document, then one per pattern
fn filter_stages(object: &MatchObject) -> Vec<Stage> {
    let (values, patterns) = split_patterns(&object.flatten());
    let mut stages = Vec::with_capacity(1 + patterns.len());

    if !values.is_empty() {
        stages.push(Stage::Match(values.into_iter().collect()));
    }
    for (path, pattern) in patterns {
        stages.push(Stage::Match(single(&path, regex_condition(&pattern))));
    }
    stages
}

/// A match object as a single filter document
pub fn filter_document(object: &MatchObject) -> Document {
    let (values, patterns) = split_patterns(&object.flatten());
    let mut doc: Document = values.into_iter().collect();
    for (path, pattern) in patterns {
        doc.insert(path, regex_condition(&pattern));
    }
    doc
}

fn combine(op: &str, matches: &[MatchObject]) -> Vec<Stage> {
    match matches {
        [] => Vec::new(),
        [only] => filter_stages(only),
        many => {
            let clauses: Vec<Value> = many
                .iter()
                .map(|m| Value::Object(filter_document(m)))
                .collect();
            vec![Stage::Match(single(op, Value::Array(clauses)))]
        }
    }
}

/// Compile a query into pipeline stages, in operation order
pub fn compile(query: &Query) -> Vec<Stage> {
    let mut stages = Vec::new();

    for op in query.folded() {
        match op {
            QueryOperation::Equals { field, value } => {
                stages.extend(filter_stages(&MatchObject::new().with(field, value)));
            }
            QueryOperation::Filter { object } => stages.extend(filter_stages(&object)),
            QueryOperation::ElementMatch { field, matcher } => {
                let inner = match matcher {
                    ElementMatcher::Value(v) => json!({ "$eq": v }),
                    ElementMatcher::Object(object) => Value::Object(filter_document(&object)),
                };
                stages.push(Stage::Match(single(&field, json!({ "$elemMatch": inner }))));
            }
            QueryOperation::NotEquals { field, value } => {
                stages.push(Stage::Match(single(&field, json!({ "$ne": value }))));
            }
            QueryOperation::NotIn { field, values } => {
                if !values.is_empty() {
                    stages.push(Stage::Match(single(&field, json!({ "$nin": values }))));
                }
            }
            QueryOperation::In { field, values } => {
                stages.push(Stage::Match(single(&field, json!({ "$in": values }))));
            }
            QueryOperation::Or { matches } => stages.extend(combine("$or", &matches)),
            QueryOperation::And { matches } => stages.extend(combine("$and", &matches)),
            QueryOperation::GreaterThan { field, value } => {
                stages.push(Stage::Match(single(&field, json!({ "$gt": value }))));
            }
            QueryOperation::LessThan { field, value } => {
                stages.push(Stage::Match(single(&field, json!({ "$lt": value }))));
            }
            QueryOperation::GreaterOrEqual { field, value } => {
                stages.push(Stage::Match(single(&field, json!({ "$gte": value }))));
            }
            QueryOperation::LessOrEqual { field, value } => {
                stages.push(Stage::Match(single(&field, json!({ "$lte": value }))));
            }
            QueryOperation::Limit { count } => stages.push(Stage::Limit(count)),
            QueryOperation::Skip { count } => stages.push(Stage::Skip(count)),
            QueryOperation::Sort { field, direction } => stages.push(Stage::Sort {
                field,
                descending: direction.is_descending(),
            }),
        }
    }

    stages
}

/// Equality document for a single field; used for `_id` lookups
pub fn by_field(field: &str, value: impl Into<Value>) -> Document {
    single(field, value.into())
}
