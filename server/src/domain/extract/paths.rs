//! Path extraction utilities
//!
//! Pure helpers for walking arbitrarily shaped JSON payloads. None of them
//! fail: a missing key, a non-object intermediate or a failed coercion all
//! produce the caller's default.
//!
//! ## Paths
//!
//! A [`KeyPath`] is either a dotted string (`"response.usage.input_tokens"`)
//! or an explicit key slice (`&["response", "usage", "input_tokens"]`). The
//! slice form is for keys that themselves contain dots. Path traversal only
//! descends into objects; arrays are reached through the structural search
//! helpers (`flatten_json`, `find_paths_with_key`, `find_values_by_key`),
//! which use stringified indices as path segments.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};

use crate::utils::time::{parse_iso_timestamp, secs_to_datetime};

/// Shared `null` to hand out as a borrowed default
pub static NULL: JsonValue = JsonValue::Null;

/// Strings that coerce to `true`; every other string is `false`
const TRUTHY_STRINGS: &[&str] = &["true", "yes", "1", "y"];

// ============================================================================
// KEY PATHS
// ============================================================================

/// A path into nested JSON objects
#[derive(Debug, Clone, Copy)]
pub enum KeyPath<'a> {
    /// Dot-delimited keys; the empty string addresses the root
    Dotted(&'a str),
    /// Explicit ordered keys
    Keys(&'a [&'a str]),
}

impl<'a> KeyPath<'a> {
    fn segments(self) -> Box<dyn Iterator<Item = &'a str> + 'a> {
        match self {
            Self::Dotted("") => Box::new(std::iter::empty()),
            Self::Dotted(path) => Box::new(path.split('.')),
            Self::Keys(keys) => Box::new(keys.iter().copied()),
        }
    }
}

impl<'a> From<&'a str> for KeyPath<'a> {
    fn from(path: &'a str) -> Self {
        Self::Dotted(path)
    }
}

impl<'a> From<&'a [&'a str]> for KeyPath<'a> {
    fn from(keys: &'a [&'a str]) -> Self {
        Self::Keys(keys)
    }
}

impl<'a, const N: usize> From<&'a [&'a str; N]> for KeyPath<'a> {
    fn from(keys: &'a [&'a str; N]) -> Self {
        Self::Keys(keys.as_slice())
    }
}

// ============================================================================
// PATH LOOKUP
// ============================================================================

/// Value at `path`, or `None` as soon as a key is missing or an
/// intermediate value is not an object. A present JSON `null` is returned.
pub fn get_path<'v, 'p>(data: &'v JsonValue, path: impl Into<KeyPath<'p>>) -> Option<&'v JsonValue> {
    path.into()
        .segments()
        .try_fold(data, |current, key| current.as_object()?.get(key))
}

/// Value at `path`, or `default` when traversal stops early
pub fn safe_extract<'v, 'p>(
    data: &'v JsonValue,
    path: impl Into<KeyPath<'p>>,
    default: &'v JsonValue,
) -> &'v JsonValue {
    get_path(data, path).unwrap_or(default)
}

/// First candidate path whose result differs from `default`
pub fn multi_path_extract<'v, 'p, P>(
    data: &'v JsonValue,
    paths: &[P],
    default: &'v JsonValue,
) -> &'v JsonValue
where
    P: Into<KeyPath<'p>> + Copy,
{
    paths
        .iter()
        .map(|p| safe_extract(data, *p, default))
        .find(|v| *v != default)
        .unwrap_or(default)
}

/// Non-null value at the first candidate path that has one
pub fn first_present<'v>(data: &'v JsonValue, paths: &[&str]) -> Option<&'v JsonValue> {
    paths
        .iter()
        .filter_map(|p| get_path(data, *p))
        .find(|v| !v.is_null())
}

// ============================================================================
// TYPE COERCION
// ============================================================================

/// Lenient conversion from a JSON value
pub trait FromJsonValue: Sized {
    fn from_json(value: &JsonValue) -> Option<Self>;
}

impl FromJsonValue for bool {
    fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Bool(b) => Some(*b),
            JsonValue::String(s) => {
                let s = s.trim().to_ascii_lowercase();
                Some(TRUTHY_STRINGS.contains(&s.as_str()))
            }
            JsonValue::Number(n) => n.as_f64().map(|f| f != 0.0),
            _ => None,
        }
    }
}

impl FromJsonValue for i64 {
    fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                    .map(|f| f.trunc() as i64)
            }),
            JsonValue::String(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                        .map(|f| f.trunc() as i64)
                })
            }
            JsonValue::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }
}

impl FromJsonValue for f64 {
    fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Number(n) => n.as_f64(),
            JsonValue::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            JsonValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

impl FromJsonValue for String {
    fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Null => None,
            JsonValue::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl FromJsonValue for DateTime<Utc> {
    fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::String(s) => parse_iso_timestamp(s),
            JsonValue::Number(n) => n.as_f64().and_then(secs_to_datetime),
            _ => None,
        }
    }
}

/// Coerce `value` to `T`, falling back to `default`
pub fn convert_value<T: FromJsonValue>(value: &JsonValue, default: T) -> T {
    T::from_json(value).unwrap_or(default)
}

/// Coerce an optional value, treating `null` as absent
pub fn convert_opt<T: FromJsonValue>(value: Option<&JsonValue>) -> Option<T> {
    value.filter(|v| !v.is_null()).and_then(T::from_json)
}

/// First non-empty string value among candidate paths; other types are skipped
pub fn first_string(data: &JsonValue, paths: &[&str]) -> Option<String> {
    paths
        .iter()
        .filter_map(|p| get_path(data, *p)?.as_str())
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Non-empty string at `path`
pub fn string_at(data: &JsonValue, path: &str) -> Option<String> {
    convert_opt::<String>(get_path(data, path)).filter(|s| !s.is_empty())
}

// ============================================================================
// STRUCTURAL SEARCH
// ============================================================================

/// Flatten nested objects and arrays into one map of delimited keys.
///
/// Only scalar leaves are kept; empty containers vanish.
pub fn flatten_json(data: &JsonValue, delimiter: &str) -> Map<String, JsonValue> {
    fn walk(value: &JsonValue, prefix: &str, delimiter: &str, out: &mut Map<String, JsonValue>) {
        let join = |segment: &str| {
            if prefix.is_empty() {
                segment.to_string()
            } else {
                format!("{}{}{}", prefix, delimiter, segment)
            }
        };
        match value {
            JsonValue::Object(map) => {
                for (key, child) in map {
                    let key = join(key);
                    match child {
                        JsonValue::Object(_) | JsonValue::Array(_) => {
                            walk(child, &key, delimiter, out)
                        }
                        leaf => {
                            out.insert(key, leaf.clone());
                        }
                    }
                }
            }
            JsonValue::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    let key = join(&i.to_string());
                    match child {
                        JsonValue::Object(_) | JsonValue::Array(_) => {
                            walk(child, &key, delimiter, out)
                        }
                        leaf => {
                            out.insert(key, leaf.clone());
                        }
                    }
                }
            }
            _ => {}
        }
    }

    let mut out = Map::new();
    walk(data, "", delimiter, &mut out);
    out
}

/// Every path (as key segments) that ends in `target_key`, depth-first
pub fn find_paths_with_key(data: &JsonValue, target_key: &str) -> Vec<Vec<String>> {
    fn walk(value: &JsonValue, target: &str, path: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
        match value {
            JsonValue::Object(map) => {
                for (key, child) in map {
                    path.push(key.clone());
                    if key == target {
                        out.push(path.clone());
                    }
                    if child.is_object() || child.is_array() {
                        walk(child, target, path, out);
                    }
                    path.pop();
                }
            }
            JsonValue::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    if child.is_object() || child.is_array() {
                        path.push(i.to_string());
                        walk(child, target, path, out);
                        path.pop();
                    }
                }
            }
            _ => {}
        }
    }

    let mut out = Vec::new();
    walk(data, target_key, &mut Vec::new(), &mut out);
    out
}

/// Every value stored under `target_key`, depth-first
pub fn find_values_by_key<'v>(data: &'v JsonValue, target_key: &str) -> Vec<&'v JsonValue> {
    fn walk<'v>(value: &'v JsonValue, target: &str, out: &mut Vec<&'v JsonValue>) {
        match value {
            JsonValue::Object(map) => {
                for (key, child) in map {
                    if key == target {
                        out.push(child);
                    }
                    walk(child, target, out);
                }
            }
            JsonValue::Array(items) => items.iter().for_each(|child| walk(child, target, out)),
            _ => {}
        }
    }

    let mut out = Vec::new();
    walk(data, target_key, &mut out);
    out
}

// ============================================================================
// MERGING AND SCHEMA MAPPING
// ============================================================================

/// Deep merge `b` into a copy of `a`.
///
/// Nested objects always merge recursively. For any other collision the
/// value from `b` wins only when `overwrite` is set.
pub fn merge_dictionaries(
    a: &Map<String, JsonValue>,
    b: &Map<String, JsonValue>,
    overwrite: bool,
) -> Map<String, JsonValue> {
    let mut merged = a.clone();
    for (key, incoming) in b {
        match (merged.get(key), incoming) {
            (Some(JsonValue::Object(existing)), JsonValue::Object(nested)) => {
                let value = merge_dictionaries(existing, nested, overwrite);
                merged.insert(key.clone(), JsonValue::Object(value));
            }
            (Some(_), _) if !overwrite => {}
            _ => {
                merged.insert(key.clone(), incoming.clone());
            }
        }
    }
    merged
}

/// Declarative field mapping: output name to ordered candidate paths.
pub type FieldSchema<'a> = &'a [(&'a str, &'a [&'a str])];

/// Resolve each field to the first candidate path holding a non-null value.
///
/// Fields with no match are left out of the result.
pub fn extract_schema_fields(data: &JsonValue, schema: FieldSchema<'_>) -> Map<String, JsonValue> {
    schema
        .iter()
        .filter_map(|(field, candidates)| {
            first_present(data, candidates).map(|v| (field.to_string(), v.clone()))
        })
        .collect()
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
