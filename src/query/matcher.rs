//! Match objects and regex patterns
//!
//! A match object maps field names to matchers. Matchers are literal JSON
//! values, regex patterns, or nested match objects; nesting addresses nested
//! fields, so `{a: {b: 1}}` and `{"a.b": 1}` match the same records.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde_json::Value;

use crate::error::{DbError, DbResult};

const ALLOWED_FLAGS: &str = "imsxu";

/// A regular expression with inline flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    flags: String,
}

impl Pattern {
    /// Create a pattern, validating source and flags.
    ///
    /// Flags are a subset of `imsxu`, stored sorted and deduplicated.
    pub fn new(source: impl Into<String>, flags: &str) -> DbResult<Self> {
        let source = source.into();

        let mut chars: Vec<char> = flags.chars().collect();
        if let Some(bad) = chars.iter().find(|c| !ALLOWED_FLAGS.contains(**c)) {
            return Err(DbError::invalid_argument(format!(
                "unsupported regex flag '{}'",
                bad
            )));
        }
        chars.sort_unstable();
        chars.dedup();

        let pattern = Self {
            source,
            flags: chars.into_iter().collect(),
        };
        pattern.compile()?;
        Ok(pattern)
    }

    /// Pattern without flags
    pub fn plain(source: impl Into<String>) -> DbResult<Self> {
        Self::new(source, "")
    }

    /// Pattern source without delimiters or flags
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Sorted flag characters
    pub fn flags(&self) -> &str {
        &self.flags
    }

    /// Render as a single pattern string with an inline flag prefix
    pub fn to_inline(&self) -> String {
        if self.flags.is_empty() {
            self.source.clone()
        } else {
            format!("(?{}){}", self.flags, self.source)
        }
    }

    /// Compile into a `Regex`
    pub fn compile(&self) -> DbResult<Regex> {
        Regex::new(&self.to_inline())
            .map_err(|e| DbError::invalid_argument(format!("invalid pattern: {}", e)))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.source, self.flags)
    }
}

/// Right-hand side of a field match
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    /// Literal equality
    Value(Value),
    /// Regular expression match on a string field
    Pattern(Pattern),
    /// Nested fields
    Object(MatchObject),
}

impl From<Value> for Matcher {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Matcher::Object(MatchObject::from(map)),
            other => Matcher::Value(other),
        }
    }
}

impl From<Pattern> for Matcher {
    fn from(pattern: Pattern) -> Self {
        Matcher::Pattern(pattern)
    }
}

impl From<MatchObject> for Matcher {
    fn from(object: MatchObject) -> Self {
        Matcher::Object(object)
    }
}

impl From<&str> for Matcher {
    fn from(s: &str) -> Self {
        Matcher::Value(Value::from(s))
    }
}

impl From<String> for Matcher {
    fn from(s: String) -> Self {
        Matcher::Value(Value::from(s))
    }
}

impl From<i32> for Matcher {
    fn from(n: i32) -> Self {
        Matcher::Value(Value::from(n))
    }
}

impl From<i64> for Matcher {
    fn from(n: i64) -> Self {
        Matcher::Value(Value::from(n))
    }
}

impl From<f64> for Matcher {
    fn from(n: f64) -> Self {
        Matcher::Value(Value::from(n))
    }
}

impl From<bool> for Matcher {
    fn from(b: bool) -> Self {
        Matcher::Value(Value::from(b))
    }
}

/// A flattened match leaf
#[derive(Debug, Clone, PartialEq)]
pub enum Leaf {
    /// Literal equality (arrays included, compared whole)
    Value(Value),
    /// Regex match
    Pattern(Pattern),
}

impl Leaf {
    /// Returns true if this leaf is a regex pattern
    pub fn is_pattern(&self) -> bool {
        matches!(self, Leaf::Pattern(_))
    }
}

/// Flattened match: full dotted path to leaf, sorted by path
pub type FlatMatch = BTreeMap<String, Leaf>;

/// Multi-field match object with keys kept in sorted order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchObject(BTreeMap<String, Matcher>);

impl MatchObject {
    /// Create an empty match object (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field matcher
    pub fn with(mut self, field: impl Into<String>, matcher: impl Into<Matcher>) -> Self {
        self.insert(field, matcher);
        self
    }

    /// Insert a field matcher
    pub fn insert(&mut self, field: impl Into<String>, matcher: impl Into<Matcher>) {
        self.0.insert(field.into(), matcher.into());
    }

    /// Build from a JSON value. `null` becomes an empty match object.
    pub fn from_json(value: Value) -> DbResult<Self> {
        match value {
            Value::Object(map) => Ok(Self::from(map)),
            Value::Null => Ok(Self::new()),
            other => Err(DbError::invalid_argument(format!(
                "match object must be a JSON object, got {}",
                other
            ))),
        }
    }

    /// Returns true if there are no field matchers
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of top-level field matchers
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Get a top-level matcher
    pub fn get(&self, field: &str) -> Option<&Matcher> {
        self.0.get(field)
    }

    /// Iterate top-level matchers in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Matcher)> {
        self.0.iter()
    }

    /// Flatten into dotted paths.
    ///
    /// Nested objects are recursed; arrays and patterns are leaves. Returns a
    /// new map and leaves `self` untouched.
    pub fn flatten(&self) -> FlatMatch {
        let mut flat = FlatMatch::new();
        flatten_into(&self.0, "", &mut flat);
        flat
    }
}

fn flatten_into(object: &BTreeMap<String, Matcher>, prefix: &str, flat: &mut FlatMatch) {
    for (key, matcher) in object {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        match matcher {
            Matcher::Object(nested) => flatten_into(&nested.0, &path, flat),
            Matcher::Pattern(p) => {
                flat.insert(path, Leaf::Pattern(p.clone()));
            }
            Matcher::Value(v) => {
                flat.insert(path, Leaf::Value(v.clone()));
            }
        }
    }
}

impl From<serde_json::Map<String, Value>> for MatchObject {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        Self(
            map.into_iter()
                .map(|(k, v)| (k, Matcher::from(v)))
                .collect(),
        )
    }
}

/// Split a flattened match into plain equality leaves and pattern leaves
pub fn split_patterns(flat: &FlatMatch) -> (BTreeMap<String, Value>, BTreeMap<String, Pattern>) {
    let mut values = BTreeMap::new();
    let mut patterns = BTreeMap::new();
    for (path, leaf) in flat {
        match leaf {
            Leaf::Value(v) => {
                values.insert(path.clone(), v.clone());
            }
            Leaf::Pattern(p) => {
                patterns.insert(path.clone(), p.clone());
            }
        }
    }
    (values, patterns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pattern_inline_flags() {
        let p = Pattern::new("^wew", "mi").unwrap();
        assert_eq!(p.flags(), "im");
        assert_eq!(p.to_inline(), "(?im)^wew");
        assert_eq!(Pattern::plain("^x").unwrap().to_inline(), "^x");
        assert_eq!(p.to_string(), "/^wew/im");
    }

    #[test]
    fn test_pattern_rejects_bad_input() {
        assert!(matches!(
            Pattern::new("a", "g"),
            Err(DbError::InvalidArgument(_))
        ));
        assert!(matches!(
            Pattern::plain("(unclosed"),
            Err(DbError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_flatten_nested() {
        let object = MatchObject::from_json(json!({"a": {"b": 1, "c": {"d": [1, 2]}}, "e": null}))
            .unwrap();
        let flat = object.flatten();

        let keys: Vec<&str> = flat.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["a.b", "a.c.d", "e"]);
        assert_eq!(flat["a.c.d"], Leaf::Value(json!([1, 2])));
        assert_eq!(flat["e"], Leaf::Value(Value::Null));
    }

    #[test]
    fn test_flatten_pattern_leaf() {
        let object = MatchObject::new()
            .with("a", MatchObject::new().with("b", Pattern::plain("^x").unwrap()))
            .with("c", 2i64);
        let flat = object.flatten();

        assert!(flat["a.b"].is_pattern());
        let (values, patterns) = split_patterns(&flat);
        assert_eq!(values.len(), 1);
        assert_eq!(patterns["a.b"].source(), "^x");
    }

    #[test]
    fn test_flatten_is_pure() {
        let object = MatchObject::from_json(json!({"a": {"b": 1}})).unwrap();
        let before = object.clone();
        let _ = object.flatten();
        assert_eq!(object, before);
    }

    #[test]
    fn test_from_json_rejects_scalars() {
        assert!(MatchObject::from_json(json!(1)).is_err());
        assert!(MatchObject::from_json(Value::Null).unwrap().is_empty());
    }
}
