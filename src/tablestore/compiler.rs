//! Query compilation for the table store
//!
//! Operations become predicate terms over the row. Dotted paths resolve to
//! `Bracket` chains; a leading `id`/`_id` segment is swapped so the logical
//! identity addresses the native primary key.
//!
//! # Index rewrite
//!
//! The first equality filter whose flattened key set names a registered
//! index becomes the selection source `GetAll{index, values}` instead of a
//! predicate scan, provided every leaf is an indexable scalar and no `Skip`
//! or `Limit` comes before it. A sort on a field with a single-field index
//! is served in index order.

use serde_json::Value;

use super::engine::{OrderKey, SelectionStage, Source, PRIMARY_KEY};
use super::term::{Func, Term};
use crate::identity::LOGICAL_ID;
use crate::index::{index_name, IndexKey, IndexRegistry};
use crate::observability::{log_event, Event};
use crate::query::{ElementMatcher, FlatMatch, Leaf, MatchObject, Query, QueryOperation};

/// Variable bound to the array element inside `Contains`
const ELEMENT_VAR: u32 = 0;

/// Compiled selection: a source and the stages after it
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSelection {
    pub source: Source,
    pub stages: Vec<SelectionStage>,
}

impl CompiledSelection {
    /// Index used as the source, if any
    pub fn index(&self) -> Option<&str> {
        match &self.source {
            Source::GetAll { index, .. } => Some(index),
            Source::Table => None,
        }
    }
}

/// Native path segments for a logical dotted path.
///
/// Only the leading segment is swapped between `_id` and `id`.
pub fn native_path(path: &str) -> Vec<String> {
    let mut segments: Vec<String> = path.split('.').map(String::from).collect();
    if let Some(first) = segments.first_mut() {
        if first == LOGICAL_ID {
            *first = PRIMARY_KEY.to_string();
        } else if first == PRIMARY_KEY {
            *first = LOGICAL_ID.to_string();
        }
    }
    segments
}

/// `Row(...)(...)` for a logical path on the row
pub fn row_path(path: &str) -> Term {
    native_path(path)
        .into_iter()
        .fold(Term::Row, |term, segment| term.bracket(segment))
}

/// Path on an array element; element fields are never swapped
fn element_path(path: &str) -> Term {
    path.split('.')
        .fold(Term::Var(ELEMENT_VAR), |term, segment| term.bracket(segment))
}

/// Conjunction of every flattened leaf, resolved against `base`
fn deep_match(flat: &FlatMatch, base: &dyn Fn(&str) -> Term) -> Term {
    let terms: Vec<Term> = flat
        .iter()
        .map(|(path, leaf)| {
            let field = base(path).default(Value::Null);
            match leaf {
                Leaf::Value(v) => field.eq(Term::Datum(v.clone())),
                Leaf::Pattern(p) => field.matches(p.to_inline()),
            }
        })
        .collect();

    match terms.len() {
        0 => Term::datum(true),
        _ => Term::and_all(terms),
    }
}

fn row_match(object: &MatchObject) -> Term {
    deep_match(&object.flatten(), &row_path)
}

fn combine(matches: &[MatchObject], join: fn(Vec<Term>) -> Term) -> Option<Term> {
    let mut terms: Vec<Term> = matches.iter().map(row_match).collect();
    match terms.len() {
        0 => None,
        1 => terms.pop(),
        _ => Some(join(terms)),
    }
}

/// Index name and key values for a filter, when it qualifies for a rewrite
fn index_lookup(
    flat: &FlatMatch,
    collection: &str,
    registry: &IndexRegistry,
) -> Option<(String, Vec<Value>)> {
    if flat.is_empty() {
        return None;
    }
    let name = index_name(flat.keys().map(String::as_str));
    let fields = registry.lookup(collection, &name)?;
    // a literal key such as "a+b" joins to the same name as the index on a, b
    if !fields.iter().eq(flat.keys()) {
        return None;
    }

    // FlatMatch iterates in sorted path order, matching the index field order
    let mut values = Vec::with_capacity(flat.len());
    for leaf in flat.values() {
        match leaf {
            Leaf::Value(v) if IndexKey::from_json(v).is_some() => values.push(v.clone()),
            _ => return None,
        }
    }
    Some((name, values))
}

/// Compile a query for `collection`
pub fn compile(query: &Query, collection: &str, registry: &IndexRegistry) -> CompiledSelection {
    let mut source = Source::Table;
    let mut stages = Vec::new();
    let mut windowed = false;

    for op in query.folded() {
        let filter_object = match &op {
            QueryOperation::Filter { object } => Some(object.clone()),
            QueryOperation::Equals { field, value } => {
                Some(MatchObject::new().with(field.clone(), value.clone()))
            }
            _ => None,
        };

        if let Some(object) = filter_object {
            let flat = object.flatten();
            if !windowed && source == Source::Table {
                if let Some((index, values)) = index_lookup(&flat, collection, registry) {
                    log_event(
                        Event::IndexRewrite,
                        &[("collection", collection), ("index", &index)],
                    );
                    source = Source::GetAll {
                        index,
                        keys: vec![values],
                    };
                    continue;
                }
            }
            if !flat.is_empty() {
                stages.push(SelectionStage::Filter(deep_match(&flat, &row_path)));
            }
            continue;
        }

        match op {
            QueryOperation::Filter { .. } | QueryOperation::Equals { .. } => {}
            QueryOperation::ElementMatch { field, matcher } => {
                let body = match matcher {
                    ElementMatcher::Value(v) => Term::Var(ELEMENT_VAR).eq(Term::Datum(v)),
                    ElementMatcher::Object(object) => {
                        let is_object =
                            Term::Var(ELEMENT_VAR).type_of().eq(Term::datum("OBJECT"));
                        let flat = object.flatten();
                        if flat.is_empty() {
                            is_object
                        } else {
                            Term::And(vec![is_object, deep_match(&flat, &element_path)])
                        }
                    }
                };
                stages.push(SelectionStage::Filter(
                    row_path(&field).contains(Func::new(ELEMENT_VAR, body)),
                ));
            }
            QueryOperation::NotEquals { field, value } => {
                stages.push(SelectionStage::Filter(
                    row_path(&field).default(Value::Null).ne(Term::Datum(value)),
                ));
            }
            QueryOperation::NotIn { field, values } => {
                if !values.is_empty() {
                    let terms = values
                        .into_iter()
                        .map(|v| row_path(&field).default(Value::Null).ne(Term::Datum(v)))
                        .collect();
                    stages.push(SelectionStage::Filter(Term::and_all(terms)));
                }
            }
            QueryOperation::In { field, values } => {
                let mut terms: Vec<Term> = values
                    .into_iter()
                    .map(|v| row_path(&field).default(Value::Null).eq(Term::Datum(v)))
                    .collect();
                let predicate = match terms.len() {
                    0 => Term::datum(false),
                    1 => terms.remove(0),
                    _ => Term::Or(terms),
                };
                stages.push(SelectionStage::Filter(predicate));
            }
            QueryOperation::Or { matches } => {
                stages.extend(combine(&matches, Term::Or).map(SelectionStage::Filter));
            }
            QueryOperation::And { matches } => {
                stages.extend(combine(&matches, Term::And).map(SelectionStage::Filter));
            }
            QueryOperation::GreaterThan { field, value } => {
                stages.push(SelectionStage::Filter(row_path(&field).gt(Term::Datum(value))));
            }
            QueryOperation::LessThan { field, value } => {
                stages.push(SelectionStage::Filter(row_path(&field).lt(Term::Datum(value))));
            }
            QueryOperation::GreaterOrEqual { field, value } => {
                stages.push(SelectionStage::Filter(row_path(&field).ge(Term::Datum(value))));
            }
            QueryOperation::LessOrEqual { field, value } => {
                stages.push(SelectionStage::Filter(row_path(&field).le(Term::Datum(value))));
            }
            QueryOperation::Limit { count } => {
                windowed = true;
                stages.push(SelectionStage::Limit(count));
            }
            QueryOperation::Skip { count } => {
                windowed = true;
                stages.push(SelectionStage::Skip(count));
            }
            QueryOperation::Sort { field, direction } => {
                let single_field = registry
                    .lookup(collection, &field)
                    .map_or(false, |fields| fields == [field.as_str()]);
                let key = if single_field {
                    log_event(
                        Event::IndexOrder,
                        &[("collection", collection), ("index", &field)],
                    );
                    OrderKey::Index(field)
                } else {
                    OrderKey::Field(row_path(&field).default(Value::Null))
                };
                stages.push(SelectionStage::OrderBy {
                    key,
                    descending: direction.is_descending(),
                });
            }
        }
    }

    CompiledSelection { source, stages }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexSpec;
    use crate::query::{Pattern, SortDirection};
    use serde_json::json;

    fn filter(value: Value) -> QueryOperation {
        QueryOperation::Filter {
            object: MatchObject::from_json(value).unwrap(),
        }
    }

    #[test]
    fn test_native_path_swaps_leading_segment_only() {
        assert_eq!(native_path("_id"), vec!["id"]);
        assert_eq!(native_path("id.x"), vec!["_id", "x"]);
        assert_eq!(native_path("a.id"), vec!["a", "id"]);
    }

    #[test]
    fn test_deep_match_terms() {
        let object = MatchObject::new()
            .with("a", MatchObject::new().with("b", Pattern::new("^x", "i").unwrap()))
            .with("c", 1i64);
        let query = Query::new().with(QueryOperation::Filter { object });
        let compiled = compile(&query, "t", &IndexRegistry::new());

        let expected = Term::And(vec![
            Term::Row
                .bracket("a")
                .bracket("b")
                .default(Value::Null)
                .matches("(?i)^x"),
            Term::Row.bracket("c").default(Value::Null).eq(Term::datum(1)),
        ]);
        assert_eq!(compiled.source, Source::Table);
        assert_eq!(compiled.stages, vec![SelectionStage::Filter(expected)]);
    }

    #[test]
    fn test_index_rewrite_first_filter_only() {
        let registry = IndexRegistry::new();
        registry.register("t", &IndexSpec::new().field("a", -1).field("b", -1));

        let query = Query::new()
            .with(filter(json!({"b": 2, "a": 1})))
            .with(filter(json!({"a": 3, "b": 4})));
        let compiled = compile(&query, "t", &registry);

        assert_eq!(
            compiled.source,
            Source::GetAll {
                index: "a+b".into(),
                keys: vec![vec![json!(1), json!(2)]],
            }
        );
        assert_eq!(compiled.index(), Some("a+b"));
        assert_eq!(compiled.stages.len(), 1);
    }

    #[test]
    fn test_no_rewrite_for_literal_joined_key() {
        let registry = IndexRegistry::new();
        registry.register("t", &IndexSpec::new().field("a", 1).field("b", 1));

        let query = Query::new().with(QueryOperation::Equals {
            field: "a+b".into(),
            value: json!(1).into(),
        });
        let compiled = compile(&query, "t", &registry);

        assert_eq!(compiled.source, Source::Table);
        assert_eq!(
            compiled.stages,
            vec![SelectionStage::Filter(
                Term::Row.bracket("a+b").default(Value::Null).eq(Term::datum(1))
            )]
        );
    }

    #[test]
    fn test_no_rewrite_after_window_or_for_patterns() {
        let registry = IndexRegistry::new();
        registry.register("t", &IndexSpec::new().field("a", 1));

        let windowed = Query::new()
            .with(QueryOperation::Limit { count: 1 })
            .with(filter(json!({"a": 1})));
        assert_eq!(compile(&windowed, "t", &registry).source, Source::Table);

        let pattern = Query::new().with(QueryOperation::Equals {
            field: "a".into(),
            value: Pattern::plain("^x").unwrap().into(),
        });
        assert_eq!(compile(&pattern, "t", &registry).source, Source::Table);

        let null_leaf = Query::new().with(filter(json!({"a": null})));
        assert_eq!(compile(&null_leaf, "t", &registry).source, Source::Table);

        let other_collection = Query::new().with(filter(json!({"a": 1})));
        assert_eq!(compile(&other_collection, "u", &registry).source, Source::Table);
    }

    #[test]
    fn test_sort_uses_index_name() {
        let registry = IndexRegistry::new();
        registry.register("t", &IndexSpec::new().field("a", -1));

        let query = Query::new()
            .with(QueryOperation::Sort {
                field: "a".into(),
                direction: SortDirection::Asc,
            })
            .with(QueryOperation::Sort {
                field: "b".into(),
                direction: SortDirection::Desc,
            });
        let compiled = compile(&query, "t", &registry);
        assert_eq!(
            compiled.stages,
            vec![
                SelectionStage::OrderBy {
                    key: OrderKey::Index("a".into()),
                    descending: false,
                },
                SelectionStage::OrderBy {
                    key: OrderKey::Field(Term::Row.bracket("b").default(Value::Null)),
                    descending: true,
                },
            ]
        );
    }

    #[test]
    fn test_element_match_uses_variable() {
        let query = Query::new().with(QueryOperation::ElementMatch {
            field: "_id".into(),
            matcher: ElementMatcher::Object(MatchObject::new().with("id", 1i64)),
        });
        let compiled = compile(&query, "t", &IndexRegistry::new());

        let body = Term::And(vec![
            Term::Var(ELEMENT_VAR).type_of().eq(Term::datum("OBJECT")),
            Term::Var(ELEMENT_VAR)
                .bracket("id")
                .default(Value::Null)
                .eq(Term::datum(1)),
        ]);
        assert_eq!(
            compiled.stages,
            vec![SelectionStage::Filter(
                Term::Row.bracket("id").contains(Func::new(ELEMENT_VAR, body))
            )]
        );
    }

    #[test]
    fn test_empty_in_matches_nothing() {
        let query = Query::new().with(QueryOperation::In {
            field: "a".into(),
            values: vec![],
        });
        let compiled = compile(&query, "t", &IndexRegistry::new());
        assert_eq!(
            compiled.stages,
            vec![SelectionStage::Filter(Term::datum(false))]
        );
    }
}
