//! Tests for path extraction utilities

use chrono::{Datelike, Timelike};
use serde_json::{Value as JsonValue, json};

use super::*;

fn sample() -> JsonValue {
    json!({
        "key1": "value1",
        "key2": {"nested": "value2"},
        "level1": {"level2": {"level3": {"level4": "deep"}}},
        "list": [1, 2, 3],
        "a.b": "dotted key"
    })
}

// ============================================================================
// safe_extract / multi_path_extract
// ============================================================================

#[test]
fn test_safe_extract_simple() {
    let data = sample();
    let fallback = json!("default");

    assert_eq!(safe_extract(&data, "key1", &NULL), &json!("value1"));
    assert_eq!(safe_extract(&data, "key2.nested", &NULL), &json!("value2"));
    assert_eq!(safe_extract(&data, "nonexistent", &NULL), &JsonValue::Null);
    assert_eq!(safe_extract(&data, "nonexistent", &fallback), &fallback);
}

#[test]
fn test_safe_extract_key_slice() {
    let data = sample();
    assert_eq!(
        safe_extract(&data, &["level1", "level2", "level3", "level4"], &NULL),
        &json!("deep")
    );
    assert_eq!(safe_extract(&data, &["a.b"], &NULL), &json!("dotted key"));
    assert_eq!(safe_extract(&data, "a.b", &NULL), &JsonValue::Null);
}

#[test]
fn test_safe_extract_stops_at_non_object() {
    let data = sample();
    let fallback = json!(-1);
    // A scalar, then an array, in the middle of the path
    assert_eq!(safe_extract(&data, "key1.more", &fallback), &fallback);
    assert_eq!(safe_extract(&data, "list.0", &fallback), &fallback);
    assert_eq!(safe_extract(&json!("scalar"), "x", &fallback), &fallback);
}

#[test]
fn test_safe_extract_is_referentially_transparent() {
    let data = sample();
    for path in ["key1", "key2.nested", "list.1", "missing.path", ""] {
        assert_eq!(
            safe_extract(&data, path, &NULL),
            safe_extract(&data, path, &NULL)
        );
    }
    assert_eq!(safe_extract(&data, "", &NULL), &data);
}

#[test]
fn test_safe_extract_returns_present_null() {
    let data = json!({"a": null});
    let fallback = json!("d");
    assert_eq!(safe_extract(&data, "a", &fallback), &JsonValue::Null);
}

#[test]
fn test_multi_path_extract() {
    let data = json!({"usage": {"prompt_tokens": 12}, "other": 5});
    assert_eq!(
        multi_path_extract(&data, &["usage.input_tokens", "usage.prompt_tokens"], &NULL),
        &json!(12)
    );
    assert_eq!(
        multi_path_extract(&data, &["missing", "also.missing"], &NULL),
        &JsonValue::Null
    );
}

#[test]
fn test_first_present_skips_null() {
    let data = json!({"a": null, "b": 0});
    assert_eq!(first_present(&data, &["a", "b"]), Some(&json!(0)));
    assert_eq!(first_present(&data, &["x"]), None);
}

// ============================================================================
// convert_value
// ============================================================================

#[test]
fn test_convert_value_bool_truth_set() {
    for truthy in ["true", "YES", "1", "y", " True "] {
        assert!(convert_value(&json!(truthy), false), "{truthy}");
    }
    for falsy in ["false", "no", "0", "maybe", ""] {
        assert!(!convert_value(&json!(falsy), true), "{falsy}");
    }
    assert!(convert_value(&json!(true), false));
    assert!(convert_value(&json!(2), false));
    assert!(convert_value(&json!({}), true));
}

#[test]
fn test_convert_value_numbers() {
    assert_eq!(convert_value(&json!("42"), 0_i64), 42);
    assert_eq!(convert_value(&json!("42.9"), 0_i64), 42);
    assert_eq!(convert_value(&json!(7.5), 0_i64), 7);
    assert_eq!(convert_value(&json!("abc"), -1_i64), -1);
    assert_eq!(convert_value(&json!(null), -1_i64), -1);

    assert_eq!(convert_value(&json!("1.25"), 0.0_f64), 1.25);
    assert_eq!(convert_value(&json!(3), 0.0_f64), 3.0);
    assert_eq!(convert_value(&json!("NaN"), 9.0_f64), 9.0);
}

#[test]
fn test_convert_value_string() {
    assert_eq!(convert_value(&json!("x"), String::new()), "x");
    assert_eq!(convert_value(&json!(12), String::new()), "12");
    assert_eq!(convert_value(&json!(null), "d".to_string()), "d");
}

#[test]
fn test_convert_value_timestamp_with_z_suffix() {
    let fallback = chrono::DateTime::<chrono::Utc>::default();
    let dt = convert_value(&json!("2025-03-17T14:08:11Z"), fallback);
    assert_eq!(dt.year(), 2025);
    assert_eq!(dt.hour(), 14);

    let bad = convert_value(&json!("not a date"), fallback);
    assert_eq!(bad, fallback);
}

#[test]
fn test_convert_opt_treats_null_as_absent() {
    let data = json!({"n": null, "v": "3"});
    assert_eq!(convert_opt::<i64>(data.get("n")), None);
    assert_eq!(convert_opt::<i64>(data.get("v")), Some(3));
    assert_eq!(convert_opt::<i64>(data.get("missing")), None);
}

#[test]
fn test_string_at_ignores_empty() {
    let data = json!({"a": {"b": ""}, "c": "x"});
    assert_eq!(string_at(&data, "a.b"), None);
    assert_eq!(string_at(&data, "c").as_deref(), Some("x"));
}

#[test]
fn test_first_string_skips_non_strings() {
    let data = json!({"model": {"type": "chat"}, "llm_type": "", "alt": "ChatOpenAI"});
    assert_eq!(
        first_string(&data, &["model", "llm_type", "alt"]).as_deref(),
        Some("ChatOpenAI")
    );
    assert_eq!(first_string(&data, &["missing"]), None);
}

// ============================================================================
// Structural search
// ============================================================================

#[test]
fn test_flatten_json() {
    let data = json!({
        "a": {"b": 1, "c": [10, {"d": true}]},
        "e": "x",
        "empty": {}
    });
    let flat = flatten_json(&data, ".");

    assert_eq!(flat.get("a.b"), Some(&json!(1)));
    assert_eq!(flat.get("a.c.0"), Some(&json!(10)));
    assert_eq!(flat.get("a.c.1.d"), Some(&json!(true)));
    assert_eq!(flat.get("e"), Some(&json!("x")));
    assert!(!flat.contains_key("empty"));
    assert_eq!(flat.len(), 4);

    let slashed = flatten_json(&data, "/");
    assert!(slashed.contains_key("a/c/1/d"));
}

#[test]
fn test_flatten_json_scalar_root_is_empty() {
    assert!(flatten_json(&json!(5), ".").is_empty());
}

#[test]
fn test_find_paths_with_key() {
    let data = json!({
        "model": "top",
        "response": {"model": "inner", "choices": [{"model": "in-list"}]}
    });
    let paths = find_paths_with_key(&data, "model");

    assert_eq!(
        paths,
        vec![
            vec!["model".to_string()],
            vec!["response".to_string(), "model".to_string()],
            vec![
                "response".to_string(),
                "choices".to_string(),
                "0".to_string(),
                "model".to_string()
            ],
        ]
    );
}

#[test]
fn test_find_values_by_key() {
    let data = json!({
        "usage": {"input_tokens": 1},
        "nested": [{"usage": {"input_tokens": 2}}]
    });
    let values = find_values_by_key(&data, "input_tokens");
    assert_eq!(values, vec![&json!(1), &json!(2)]);
    assert!(find_values_by_key(&data, "nope").is_empty());
}

// ============================================================================
// merge_dictionaries / extract_schema_fields
// ============================================================================

#[test]
fn test_merge_dictionaries_overwrite() {
    let a = json!({"x": 1, "nested": {"k": "a", "keep": true}});
    let b = json!({"x": 2, "nested": {"k": "b", "new": 1}, "y": 3});
    let merged = merge_dictionaries(a.as_object().unwrap(), b.as_object().unwrap(), true);

    assert_eq!(
        JsonValue::Object(merged),
        json!({"x": 2, "nested": {"k": "b", "keep": true, "new": 1}, "y": 3})
    );
}

#[test]
fn test_merge_dictionaries_without_overwrite_still_recurses() {
    let a = json!({"x": 1, "nested": {"k": "a"}});
    let b = json!({"x": 2, "nested": {"k": "b", "new": 1}, "y": 3});
    let merged = merge_dictionaries(a.as_object().unwrap(), b.as_object().unwrap(), false);

    assert_eq!(
        JsonValue::Object(merged),
        json!({"x": 1, "nested": {"k": "a", "new": 1}, "y": 3})
    );
}

#[test]
fn test_extract_schema_fields_first_candidate_wins() {
    let data = json!({
        "usage": {"input_tokens": 10, "prompt_tokens": 99},
        "model": null,
        "response": {"model": "gpt-4o"}
    });
    let schema: FieldSchema<'_> = &[
        ("input", &["usage.input_tokens", "usage.prompt_tokens"]),
        ("model", &["model", "response.model"]),
        ("missing", &["nope"]),
    ];
    let fields = extract_schema_fields(&data, schema);

    assert_eq!(fields.get("input"), Some(&json!(10)));
    assert_eq!(fields.get("model"), Some(&json!("gpt-4o")));
    assert!(!fields.contains_key("missing"));
}

#[test]
fn test_extract_schema_fields_is_order_deterministic() {
    let data = json!({"source_a": {"value": "A"}, "source_b": {"value": "B"}});

    let a_first: FieldSchema<'_> = &[("value", &["source_a.value", "source_b.value"])];
    let b_first: FieldSchema<'_> = &[("value", &["source_b.value", "source_a.value"])];

    assert_eq!(
        extract_schema_fields(&data, a_first).get("value"),
        Some(&json!("A"))
    );
    assert_eq!(
        extract_schema_fields(&data, b_first).get("value"),
        Some(&json!("B"))
    );
}
