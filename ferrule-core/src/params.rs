//! Parameter bag helpers
//!
//! The `product` bag of a job is a `serde_json::Value` tree. Executors read
//! it through these helpers so that every shape a field may take in YAML is
//! matched explicitly.

use serde_json::{Map, Value};

/// Canonical text form of a value
///
/// Strings are returned verbatim; every other value is compact JSON
/// (`42`, `true`, `null`, `{"a":1}`).
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Scalar field as a string
///
/// Numbers and booleans are stringified (`vmid: 100` is common in YAML);
/// null, lists and maps are treated as absent.
pub fn string(bag: &Map<String, Value>, key: &str) -> Option<String> {
    match bag.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Boolean field; accepts `true`/`"true"`/`"1"`
pub fn flag(bag: &Map<String, Value>, key: &str) -> bool {
    match bag.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true" || s == "1",
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

/// Nested map field
pub fn object<'a>(bag: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    match bag.get(key)? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Command block: a string used as-is, or a list of strings joined by newlines
///
/// Non-string list items are skipped.
pub fn command_block(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        _ => None,
    }
}

/// Script lines: a multi-line string split into trimmed non-empty lines, or
/// a list whose string items (and string items of nested lists) become lines
pub fn lines(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Array(items) => items
            .iter()
            .flat_map(|item| match item {
                Value::String(s) => vec![s.clone()],
                Value::Array(inner) => inner
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                _ => Vec::new(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_to_text() {
        assert_eq!(to_text(&json!("plain")), "plain");
        assert_eq!(to_text(&json!(42)), "42");
        assert_eq!(to_text(&json!(true)), "true");
        assert_eq!(to_text(&json!(null)), "null");
        assert_eq!(to_text(&json!({"a": [1, 2]})), r#"{"a":[1,2]}"#);
    }

    #[test]
    fn test_string_accepts_scalars_only() {
        let product = bag(json!({"host": "pve", "vmid": 100, "tags": ["a"], "none": null}));
        assert_eq!(string(&product, "host").as_deref(), Some("pve"));
        assert_eq!(string(&product, "vmid").as_deref(), Some("100"));
        assert_eq!(string(&product, "tags"), None);
        assert_eq!(string(&product, "none"), None);
        assert_eq!(string(&product, "missing"), None);
    }

    #[test]
    fn test_flag() {
        let product = bag(json!({"a": true, "b": "1", "c": "no", "d": 1}));
        assert!(flag(&product, "a"));
        assert!(flag(&product, "b"));
        assert!(!flag(&product, "c"));
        assert!(flag(&product, "d"));
        assert!(!flag(&product, "missing"));
    }

    #[test]
    fn test_command_block() {
        assert_eq!(command_block(&json!("echo hi")).unwrap(), "echo hi");
        assert_eq!(
            command_block(&json!(["echo a", 3, "echo b"])).unwrap(),
            "echo a\necho b"
        );
        assert_eq!(command_block(&json!({"x": 1})), None);
    }

    #[test]
    fn test_lines() {
        assert_eq!(lines(&json!("  a\n\n b  \n")), vec!["a", "b"]);
        assert_eq!(lines(&json!(["a", ["b", "c"], 5])), vec!["a", "b", "c"]);
        assert!(lines(&json!(null)).is_empty());
    }
}
