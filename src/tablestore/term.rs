//! Predicate terms
//!
//! A small expression language evaluated once per row. `Row` is the row being
//! filtered; `Var(n)` is the argument of an enclosing [`Func`] (used by
//! `Contains` to test array elements).
//!
//! Evaluation rules:
//!
//! - `Bracket` on a missing field or a non-object is a non-existence error
//! - `Default` replaces a non-existence error with its fallback
//! - comparisons between values of different types are false
//! - `Match` on a non-string and `Contains` on a non-array are false

use std::cmp::Ordering;
use std::fmt;

use regex::Regex;
use serde_json::Value;

use crate::document::json_eq;

/// Term evaluation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// Field missing from the row
    NonExistence(String),
    /// Operand of the wrong type or malformed term
    Query(String),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::NonExistence(msg) => write!(f, "Non-existence error: {}", msg),
            EvalError::Query(msg) => write!(f, "Query error: {}", msg),
        }
    }
}

type EvalResult<T> = Result<T, EvalError>;

/// Single-argument function used by `Contains`
#[derive(Debug, Clone, PartialEq)]
pub struct Func {
    pub var: u32,
    pub body: Box<Term>,
}

impl Func {
    pub fn new(var: u32, body: Term) -> Self {
        Self {
            var,
            body: Box::new(body),
        }
    }
}

/// Expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Row,
    Var(u32),
    Datum(Value),
    Bracket(Box<Term>, String),
    Default(Box<Term>, Box<Term>),
    Eq(Box<Term>, Box<Term>),
    Ne(Box<Term>, Box<Term>),
    Gt(Box<Term>, Box<Term>),
    Ge(Box<Term>, Box<Term>),
    Lt(Box<Term>, Box<Term>),
    Le(Box<Term>, Box<Term>),
    /// Regex with inline flags, e.g. `(?i)^wew`
    Match(Box<Term>, String),
    And(Vec<Term>),
    Or(Vec<Term>),
    Not(Box<Term>),
    Contains(Box<Term>, Func),
    /// Type name of the operand, e.g. `"OBJECT"`
    TypeOf(Box<Term>),
}

impl Term {
    pub fn datum(value: impl Into<Value>) -> Self {
        Term::Datum(value.into())
    }

    /// `self(field)`
    pub fn bracket(self, field: impl Into<String>) -> Self {
        Term::Bracket(Box::new(self), field.into())
    }

    pub fn default(self, fallback: impl Into<Value>) -> Self {
        Term::Default(Box::new(self), Box::new(Term::Datum(fallback.into())))
    }

    pub fn eq(self, other: Term) -> Self {
        Term::Eq(Box::new(self), Box::new(other))
    }

    pub fn ne(self, other: Term) -> Self {
        Term::Ne(Box::new(self), Box::new(other))
    }

    pub fn gt(self, other: Term) -> Self {
        Term::Gt(Box::new(self), Box::new(other))
    }

    pub fn ge(self, other: Term) -> Self {
        Term::Ge(Box::new(self), Box::new(other))
    }

    pub fn lt(self, other: Term) -> Self {
        Term::Lt(Box::new(self), Box::new(other))
    }

    pub fn le(self, other: Term) -> Self {
        Term::Le(Box::new(self), Box::new(other))
    }

    pub fn matches(self, pattern: impl Into<String>) -> Self {
        Term::Match(Box::new(self), pattern.into())
    }

    pub fn not(self) -> Self {
        Term::Not(Box::new(self))
    }

    pub fn contains(self, func: Func) -> Self {
        Term::Contains(Box::new(self), func)
    }

    pub fn type_of(self) -> Self {
        Term::TypeOf(Box::new(self))
    }

    /// Conjunction; a single term is returned as is
    pub fn and_all(mut terms: Vec<Term>) -> Self {
        if terms.len() == 1 {
            terms.remove(0)
        } else {
            Term::And(terms)
        }
    }

    /// Evaluate against a row
    pub fn eval(&self, row: &Value) -> EvalResult<Value> {
        self.eval_in(&Scope { row, vars: Vec::new() })
    }

    fn eval_in(&self, scope: &Scope<'_>) -> EvalResult<Value> {
        match self {
            Term::Row => Ok(scope.row.clone()),
            Term::Var(n) => scope
                .vars
                .iter()
                .rev()
                .find(|(var, _)| var == n)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| EvalError::Query(format!("unbound variable {}", n))),
            Term::Datum(v) => Ok(v.clone()),
            Term::Bracket(target, field) => match target.eval_in(scope)? {
                Value::Object(mut map) => map.remove(field).ok_or_else(|| {
                    EvalError::NonExistence(format!("No attribute `{}` in object", field))
                }),
                other => Err(EvalError::NonExistence(format!(
                    "Cannot perform bracket on a non-object: {}",
                    type_name(&other)
                ))),
            },
            Term::Default(target, fallback) => match target.eval_in(scope) {
                Err(EvalError::NonExistence(_)) => fallback.eval_in(scope),
                other => other,
            },
            Term::Eq(a, b) => Ok(Value::Bool(json_eq(&a.eval_in(scope)?, &b.eval_in(scope)?))),
            Term::Ne(a, b) => Ok(Value::Bool(!json_eq(&a.eval_in(scope)?, &b.eval_in(scope)?))),
            Term::Gt(a, b) => compare(a, b, scope, |o| o == Ordering::Greater),
            Term::Ge(a, b) => compare(a, b, scope, |o| o != Ordering::Less),
            Term::Lt(a, b) => compare(a, b, scope, |o| o == Ordering::Less),
            Term::Le(a, b) => compare(a, b, scope, |o| o != Ordering::Greater),
            Term::Match(target, pattern) => {
                let regex = Regex::new(pattern)
                    .map_err(|e| EvalError::Query(format!("invalid regex: {}", e)))?;
                Ok(Value::Bool(match target.eval_in(scope)? {
                    Value::String(s) => regex.is_match(&s),
                    _ => false,
                }))
            }
            Term::And(terms) => {
                for term in terms {
                    if !truthy(&term.eval_in(scope)?) {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Term::Or(terms) => {
                for term in terms {
                    if truthy(&term.eval_in(scope)?) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Term::Not(term) => Ok(Value::Bool(!truthy(&term.eval_in(scope)?))),
            Term::Contains(seq, func) => {
                let Value::Array(items) = seq.eval_in(scope)? else {
                    return Ok(Value::Bool(false));
                };
                for item in items {
                    let mut inner = Scope {
                        row: scope.row,
                        vars: scope.vars.clone(),
                    };
                    inner.vars.push((func.var, item));
                    if truthy(&func.body.eval_in(&inner)?) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Term::TypeOf(target) => Ok(Value::from(type_name(&target.eval_in(scope)?))),
        }
    }
}

struct Scope<'a> {
    row: &'a Value,
    vars: Vec<(u32, Value)>,
}

fn compare(
    a: &Term,
    b: &Term,
    scope: &Scope<'_>,
    accept: impl Fn(Ordering) -> bool,
) -> EvalResult<Value> {
    let a = a.eval_in(scope)?;
    let b = b.eval_in(scope)?;
    if type_rank(&a) != type_rank(&b) {
        return Ok(Value::Bool(false));
    }
    Ok(Value::Bool(accept(compare_values(&a, &b))))
}

/// `false` and `null` are falsy, everything else is truthy
pub fn truthy(value: &Value) -> bool {
    !matches!(value, Value::Bool(false) | Value::Null)
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Array(_) => "ARRAY",
        Value::Bool(_) => "BOOL",
        Value::Null => "NULL",
        Value::Number(_) => "NUMBER",
        Value::Object(_) => "OBJECT",
        Value::String(_) => "STRING",
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Array(_) => 0,
        Value::Bool(_) => 1,
        Value::Null => 2,
        Value::Number(_) => 3,
        Value::Object(_) => 4,
        Value::String(_) => 5,
    }
}

/// Total order: arrays, booleans, null, numbers, objects, strings
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (a, b) in x.iter().zip(y) {
                let ord = compare_values(a, b);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            for ((ka, va), (kb, vb)) in x.iter().zip(y) {
                let ord = ka.cmp(kb).then_with(|| compare_values(va, vb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bracket_and_default() {
        let row = json!({"a": {"b": 1}, "s": "x"});
        let path = Term::Row.bracket("a").bracket("b");
        assert_eq!(path.clone().eval(&row).unwrap(), json!(1));

        let missing = Term::Row.bracket("z").bracket("q");
        assert!(matches!(missing.clone().eval(&row), Err(EvalError::NonExistence(_))));
        assert_eq!(missing.default(Value::Null).eval(&row).unwrap(), Value::Null);

        let through_scalar = Term::Row.bracket("s").bracket("q");
        assert!(matches!(through_scalar.eval(&row), Err(EvalError::NonExistence(_))));
    }

    #[test]
    fn test_comparisons_same_type_only() {
        let row = json!({"n": 5, "s": "5"});
        assert_eq!(Term::Row.bracket("n").gt(Term::datum(4)).eval(&row).unwrap(), json!(true));
        assert_eq!(Term::Row.bracket("n").le(Term::datum(5.0)).eval(&row).unwrap(), json!(true));
        assert_eq!(Term::Row.bracket("s").gt(Term::datum(4)).eval(&row).unwrap(), json!(false));
        assert_eq!(Term::Row.bracket("n").eq(Term::datum(5.0)).eval(&row).unwrap(), json!(true));
    }

    #[test]
    fn test_match_and_logic() {
        let row = json!({"s": "Wow", "n": 1});
        let term = Term::And(vec![
            Term::Row.bracket("s").matches("(?i)^w"),
            Term::Row.bracket("n").ne(Term::datum(2)),
        ]);
        assert_eq!(term.eval(&row).unwrap(), json!(true));

        let no_string = Term::Row.bracket("n").matches("1");
        assert_eq!(no_string.eval(&row).unwrap(), json!(false));

        let either = Term::Or(vec![Term::datum(false), Term::datum(Value::Null)]);
        assert_eq!(either.clone().eval(&row).unwrap(), json!(false));
        assert_eq!(either.not().eval(&row).unwrap(), json!(true));
    }

    #[test]
    fn test_contains_with_var() {
        let row = json!({"arr": [1, {"x": 1, "y": 2}], "s": "abc"});
        let scalar = Term::Row
            .bracket("arr")
            .contains(Func::new(0, Term::Var(0).eq(Term::datum(1))));
        assert_eq!(scalar.eval(&row).unwrap(), json!(true));

        let object = Term::Row.bracket("arr").contains(Func::new(
            0,
            Term::Var(0).bracket("y").default(Value::Null).eq(Term::datum(2)),
        ));
        assert_eq!(object.eval(&row).unwrap(), json!(true));

        let not_array = Term::Row
            .bracket("s")
            .contains(Func::new(0, Term::datum(true)));
        assert_eq!(not_array.eval(&row).unwrap(), json!(false));
    }

    #[test]
    fn test_type_of() {
        let row = json!({"o": {}, "n": 1});
        assert_eq!(Term::Row.bracket("o").type_of().eval(&row).unwrap(), json!("OBJECT"));
        assert_eq!(Term::Row.bracket("n").type_of().eval(&row).unwrap(), json!("NUMBER"));
        assert!(matches!(
            Term::Row.bracket("z").type_of().eval(&row),
            Err(EvalError::NonExistence(_))
        ));
    }

    #[test]
    fn test_type_order() {
        let ordered = [json!([1]), json!(true), json!(null), json!(1), json!({}), json!("a")];
        for pair in ordered.windows(2) {
            assert_eq!(compare_values(&pair[0], &pair[1]), Ordering::Less);
        }
    }
}
