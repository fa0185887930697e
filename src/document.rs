//! Document type and dotted-path helpers
//!
//! A document is a JSON object. Paths address nested fields with
//! `.`-separated segment names (`"a.b.c"`).

use serde_json::{Map, Value};

/// A stored record body
pub type Document = Map<String, Value>;

/// Split a dotted path into its segments
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.')
}

/// Get a nested value by dotted path
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = segments(path);
    let first = parts.next()?;
    let mut current = doc.get(first)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Set a nested value by dotted path.
///
/// Missing or non-object intermediates are replaced by empty objects.
pub fn set_path(doc: &mut Document, path: &str, value: Value) {
    let parts: Vec<&str> = segments(path).collect();
    let Some((last, parents)) = parts.split_last() else {
        return;
    };

    let mut current = doc;
    for part in parents {
        let slot = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        current = match slot {
            Value::Object(map) => map,
            _ => return,
        };
    }
    current.insert(last.to_string(), value);
}

/// Remove a nested value by dotted path, returning it if present
pub fn remove_path(doc: &mut Document, path: &str) -> Option<Value> {
    let parts: Vec<&str> = segments(path).collect();
    let (last, parents) = parts.split_last()?;

    let mut current = doc;
    for part in parents {
        current = current.get_mut(*part)?.as_object_mut()?;
    }
    current.remove(*last)
}

/// Top-level segment of a dotted path
pub fn top_level(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}

/// Deep equality where numbers compare by value (`1 == 1.0`)
pub fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| json_eq(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).map_or(false, |other| json_eq(v, other)))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_get_nested() {
        let d = doc(json!({"a": 1, "b": {"a": 2}}));
        assert_eq!(get_path(&d, "a"), Some(&json!(1)));
        assert_eq!(get_path(&d, "b.a"), Some(&json!(2)));
        assert_eq!(get_path(&d, "b.c"), None);
        assert_eq!(get_path(&d, "a.b"), None);
    }

    #[test]
    fn test_set_creates_intermediates() {
        let mut d = doc(json!({"a": 1}));
        set_path(&mut d, "b.c.d", json!(true));
        assert_eq!(get_path(&d, "b.c.d"), Some(&json!(true)));

        // Scalar intermediate replaced
        set_path(&mut d, "a.x", json!(5));
        assert_eq!(Value::Object(d), json!({"a": {"x": 5}, "b": {"c": {"d": true}}}));
    }

    #[test]
    fn test_remove_path() {
        let mut d = doc(json!({"a": {"b": 1, "c": 2}}));
        assert_eq!(remove_path(&mut d, "a.b"), Some(json!(1)));
        assert_eq!(remove_path(&mut d, "a.zz"), None);
        assert_eq!(Value::Object(d), json!({"a": {"c": 2}}));
    }

    #[test]
    fn test_top_level() {
        assert_eq!(top_level("a.b.c"), "a");
        assert_eq!(top_level("plain"), "plain");
    }

    #[test]
    fn test_json_eq_numeric() {
        assert!(json_eq(&json!(1), &json!(1.0)));
        assert!(json_eq(&json!({"a": [1, 2.0]}), &json!({"a": [1.0, 2]})));
        assert!(!json_eq(&json!([1, 2]), &json!([2, 1])));
        assert!(!json_eq(&json!("1"), &json!(1)));
    }
}
