//! Safe traversal of person lookup payloads.
//!
//! Partial absence is the normal case for these payloads, so every accessor
//! here returns the caller's default instead of failing when a key is missing
//! or an intermediate node is not an object.

use serde_json::Value;

/// Walks `path` from `root`, returning `None` as soon as a key is missing or
/// the current node is not an object.
pub fn deep_get<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(root, |node, key| node.as_object().and_then(|obj| obj.get(*key)))
        .filter(|value| !value.is_null())
}

/// Walks `path` and converts the leaf, falling back to `default` on any miss.
pub fn deep_get_or<T: FromPayload>(root: &Value, path: &[&str], default: T) -> T {
    deep_get_as(root, path).unwrap_or(default)
}

/// Walks `path` and converts the leaf into `T`.
pub fn deep_get_as<T: FromPayload>(root: &Value, path: &[&str]) -> Option<T> {
    deep_get(root, path).and_then(T::from_payload)
}

/// Lenient conversion from a payload leaf.
pub trait FromPayload: Sized {
    fn from_payload(value: &Value) -> Option<Self>;
}

impl FromPayload for String {
    fn from_payload(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl FromPayload for i64 {
    fn from_payload(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromPayload for f64 {
    fn from_payload(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromPayload for bool {
    fn from_payload(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|i| i != 0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Returns the list at `path`, or an empty slice when absent or not a list.
pub fn deep_get_list<'a>(root: &'a Value, path: &[&str]) -> &'a [Value] {
    deep_get(root, path)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Flattens a value that may arrive either as a flat list or as a mapping of
/// group name to list. Any other shape yields an empty list.
///
/// Mapping groups are concatenated in map iteration order.
pub fn flatten_grouped(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Object(groups)) => groups
            .values()
            .filter_map(Value::as_array)
            .flatten()
            .collect(),
        _ => Vec::new(),
    }
}

/// Parses an `"N-M"` range, splitting once on the first hyphen.
///
/// Returns `(None, None)` for anything that is not two integers around a hyphen.
pub fn parse_age_range(raw: Option<&str>) -> (Option<i64>, Option<i64>) {
    let Some((low, high)) = raw.and_then(|r| r.split_once('-')) else {
        return (None, None);
    };
    match (low.trim().parse::<i64>(), high.trim().parse::<i64>()) {
        (Ok(min), Ok(max)) => (Some(min), Some(max)),
        _ => (None, None),
    }
}
