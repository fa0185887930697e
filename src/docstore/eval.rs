//! Filter document evaluation
//!
//! Evaluates native filter documents against stored documents. Dotted paths
//! traverse arrays of sub-documents, and a condition on an array field holds
//! when the array itself or any of its elements satisfies it. `$in` and
//! `$nin` are the exception: they compare the field as a whole value.
//!
//! Supported operators: `$eq`, `$ne`, `$in`, `$nin`, `$gt`, `$gte`, `$lt`,
//! `$lte`, `$regex` (with `$options`), `$elemMatch`, `$exists`, and the
//! top-level combinators `$and`, `$or`, `$nor`.

use std::cmp::Ordering;

use regex::Regex;
use serde_json::{Map, Value};

use super::errors::{DocStoreError, DocStoreResult};
use crate::document::{json_eq, Document};
use crate::query::Pattern;

/// Returns true if `doc` satisfies `filter`
pub fn matches(doc: &Document, filter: &Document) -> DocStoreResult<bool> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => all_of(doc, condition)?,
            "$or" => any_of(doc, condition)?,
            "$nor" => !any_of(doc, condition)?,
            k if k.starts_with('$') => {
                return Err(DocStoreError::BadQuery(format!(
                    "unknown top level operator: {}",
                    k
                )))
            }
            path => {
                let candidates = resolve(doc, path);
                match operator_document(condition) {
                    Some(ops) => eval_operators(&candidates, ops)?,
                    None => equals_any(&candidates, condition),
                }
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses(condition: &Value) -> DocStoreResult<Vec<&Document>> {
    let Value::Array(items) = condition else {
        return Err(DocStoreError::BadQuery(
            "$and/$or/$nor must be an array".into(),
        ));
    };
    if items.is_empty() {
        return Err(DocStoreError::BadQuery(
            "$and/$or/$nor must be a nonempty array".into(),
        ));
    }
    items
        .iter()
        .map(|item| {
            item.as_object().ok_or_else(|| {
                DocStoreError::BadQuery("$and/$or/$nor entries must be objects".into())
            })
        })
        .collect()
}

fn all_of(doc: &Document, condition: &Value) -> DocStoreResult<bool> {
    for clause in clauses(condition)? {
        if !matches(doc, clause)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any_of(doc: &Document, condition: &Value) -> DocStoreResult<bool> {
    for clause in clauses(condition)? {
        if matches(doc, clause)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// `Some` if every key of `condition` is an operator
fn operator_document(condition: &Value) -> Option<&Map<String, Value>> {
    match condition {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => {
            Some(map)
        }
        _ => None,
    }
}

/// Resolve a dotted path into candidate values, descending into arrays of
/// sub-documents. An empty result means the field is missing.
pub fn resolve<'a>(doc: &'a Document, path: &str) -> Vec<&'a Value> {
    let mut current: Vec<&Value> = Vec::new();
    let mut parts = path.split('.');

    let Some(first) = parts.next() else {
        return current;
    };
    if let Some(v) = doc.get(first) {
        current.push(v);
    }

    for part in parts {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => next.extend(map.get(part)),
                Value::Array(items) => {
                    for item in items {
                        if let Value::Object(map) = item {
                            next.extend(map.get(part));
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }
    current
}

/// Candidates plus the elements of array candidates
fn expand<'a>(candidates: &[&'a Value]) -> Vec<&'a Value> {
    let mut out = Vec::with_capacity(candidates.len());
    for value in candidates {
        out.push(*value);
        if let Value::Array(items) = value {
            out.extend(items.iter());
        }
    }
    out
}

fn equals_any(candidates: &[&Value], expected: &Value) -> bool {
    if expected.is_null() && candidates.is_empty() {
        return true;
    }
    expand(candidates).iter().any(|v| json_eq(v, expected))
}

fn eval_operators(candidates: &[&Value], ops: &Map<String, Value>) -> DocStoreResult<bool> {
    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$eq" => equals_any(candidates, arg),
            "$ne" => !equals_any(candidates, arg),
            "$in" => in_list(candidates, arg)?,
            "$nin" => !in_list(candidates, arg)?,
            "$gt" => compare_any(candidates, arg, |o| o == Ordering::Greater),
            "$gte" => compare_any(candidates, arg, |o| o != Ordering::Less),
            "$lt" => compare_any(candidates, arg, |o| o == Ordering::Less),
            "$lte" => compare_any(candidates, arg, |o| o != Ordering::Greater),
            "$regex" => {
                let options = ops.get("$options").and_then(Value::as_str).unwrap_or("");
                let regex = compile_regex(arg, options)?;
                expand(candidates)
                    .iter()
                    .any(|v| v.as_str().map_or(false, |s| regex.is_match(s)))
            }
            "$options" => true,
            "$elemMatch" => elem_match(candidates, arg)?,
            "$exists" => {
                let wanted = arg.as_bool().ok_or_else(|| {
                    DocStoreError::BadQuery("$exists needs a boolean".into())
                })?;
                wanted != candidates.is_empty()
            }
            other => {
                return Err(DocStoreError::BadQuery(format!(
                    "unknown operator: {}",
                    other
                )))
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn in_list(candidates: &[&Value], arg: &Value) -> DocStoreResult<bool> {
    let Value::Array(options) = arg else {
        return Err(DocStoreError::BadQuery("$in/$nin needs an array".into()));
    };
    Ok(options.iter().any(|option| equals_whole(candidates, option)))
}

/// Equality against each candidate as a whole value, without descending
/// into array elements
fn equals_whole(candidates: &[&Value], expected: &Value) -> bool {
    if expected.is_null() && candidates.is_empty() {
        return true;
    }
    candidates.iter().any(|v| json_eq(v, expected))
}

/// Comparison operators only compare within the same type bracket
fn compare_any(candidates: &[&Value], bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    expand(candidates)
        .iter()
        .any(|v| match (v, bound) {
            (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b).map_or(false, &accept),
                _ => false,
            },
            (Value::String(a), Value::String(b)) => accept(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => accept(a.cmp(b)),
            _ => false,
        })
}

fn compile_regex(source: &Value, options: &str) -> DocStoreResult<Regex> {
    let source = source
        .as_str()
        .ok_or_else(|| DocStoreError::BadQuery("$regex has to be a string".into()))?;
    Pattern::new(source, options)
        .and_then(|p| p.compile())
        .map_err(|e| DocStoreError::BadQuery(e.to_string()))
}

fn elem_match(candidates: &[&Value], arg: &Value) -> DocStoreResult<bool> {
    let Value::Object(spec) = arg else {
        return Err(DocStoreError::BadQuery("$elemMatch needs an Object".into()));
    };

    for candidate in candidates {
        let Value::Array(items) = candidate else {
            continue;
        };
        for item in items {
            let hit = match operator_document(arg) {
                Some(ops) => element_operators(item, ops)?,
                None => match item {
                    Value::Object(element) => matches(element, spec)?,
                    _ => false,
                },
            };
            if hit {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Operators applied to a single array element. Equality is exact so an
/// element that is itself an array never matches one of its members.
fn element_operators(item: &Value, ops: &Map<String, Value>) -> DocStoreResult<bool> {
    let mut rest = Map::new();
    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$eq" => json_eq(item, arg),
            "$ne" => !json_eq(item, arg),
            _ => {
                rest.insert(op.clone(), arg.clone());
                true
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    if rest.is_empty() {
        return Ok(true);
    }
    eval_operators(&[item], &rest)
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

/// Sort order: missing and null, numbers, strings, objects, arrays, booleans
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Array(x)), Some(Value::Array(y))) => {
            for (a, b) in x.iter().zip(y) {
                let ord = compare_values(Some(a), Some(b));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Some(Value::Object(x)), Some(Value::Object(y))) => {
            for ((ka, va), (kb, vb)) in x.iter().zip(y) {
                let ord = ka.cmp(kb).then_with(|| compare_values(Some(va), Some(vb)));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => Ordering::Equal,
    }
}
