//! String utility functions

use std::sync::LazyLock;

use regex::Regex;

static NUMERIC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("Invalid regex"));

/// Truncate text to at most `max_chars` characters (no ellipsis, char-boundary safe)
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Lowercase, trim, and collapse internal whitespace runs to a single space.
pub fn normalize_string(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// All numeric literals (integers and decimals, optionally negative) in `text`.
pub fn extract_numeric_values(text: &str) -> Vec<f64> {
    NUMERIC_PATTERN
        .find_iter(text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

/// Check if haystack contains needle (case-insensitive, ASCII only).
#[inline]
pub fn contains_ascii_ignore_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    if haystack.len() < needle.len() {
        return false;
    }
    haystack
        .as_bytes()
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}
