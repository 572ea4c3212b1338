//! JSON coercion helpers.
//!
//! Marketplace payloads are loose about scalar types: the same field can
//! arrive as `10`, `"10"` or be missing entirely depending on the
//! platform, endpoint and API revision. All parsing goes through these
//! helpers so each adapter handles the looseness the same way.

use serde_json::Value;

/// Reads a JSON value as an integer, accepting numbers and numeric strings.
pub(crate) fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Reads a JSON value as a string, accepting strings and numbers.
pub(crate) fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_i64() {
        assert_eq!(coerce_i64(&json!(10)), Some(10));
        assert_eq!(coerce_i64(&json!("10")), Some(10));
        assert_eq!(coerce_i64(&json!(" 7 ")), Some(7));
        assert_eq!(coerce_i64(&json!(null)), None);
        assert_eq!(coerce_i64(&json!("ten")), None);
    }

    #[test]
    fn test_coerce_string() {
        assert_eq!(coerce_string(&json!("abc")), Some("abc".to_string()));
        assert_eq!(coerce_string(&json!(123)), Some("123".to_string()));
        assert_eq!(coerce_string(&json!([])), None);
    }
}
