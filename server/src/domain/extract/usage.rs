//! Shared LLM payload parsing
//!
//! Token usage, response text and provider hints appear in several event
//! kinds under different shapes. The extractors that own those kinds all
//! parse through here so the shapes are recognized in one place.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value as JsonValue;

use super::paths::{FieldSchema, convert_opt, extract_schema_fields, first_string, get_path};
use crate::data::types::TokenUsage;
use crate::utils::string::contains_ascii_ignore_case;

/// Candidate locations of a structured usage block, most specific first
const USAGE_BLOCK_PATHS: &[&str] = &[
    "response.usage",
    "token_usage",
    "llm_output.usage",
    "response.llm_output.usage",
    "response.message.usage_metadata",
    "response.usage_metadata",
    "usage",
];

/// Field aliases inside a usage block
const USAGE_FIELDS: FieldSchema<'static> = &[
    ("input", &["input_tokens", "prompt_tokens"]),
    ("output", &["output_tokens", "completion_tokens"]),
    ("total", &["total_tokens"]),
    (
        "cache_read",
        &["cache_read_input_tokens", "cache_read_tokens"],
    ),
    (
        "cache_creation",
        &["cache_creation_input_tokens", "cache_creation_tokens"],
    ),
];

/// Candidate locations of the model name
const MODEL_NAME_PATHS: &[&str] = &[
    "model.name",
    "model",
    "response.model",
    "response.model_name",
    "llm_output.model",
    "llm_output.model_name",
    "response.llm_output.model",
    "response.llm_output.model_name",
];

/// Literal prefix of the legacy tuple serialization of response text
const TEXT_TUPLE_PREFIX: &str = "('text',";

static INPUT_TOKENS_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'input_tokens':\s*(\d+)").expect("Invalid regex"));

static OUTPUT_TOKENS_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'output_tokens':\s*(\d+)").expect("Invalid regex"));

static TEXT_TUPLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)\('text', ["'](.*)["']\)"#).expect("Invalid regex"));

static MESSAGE_CONTENT_REPR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"content=["']([^"']+)["']"#).expect("Invalid regex"));

// ============================================================================
// TOKEN USAGE
// ============================================================================

/// Build a usage record from raw counts.
///
/// Returns `None` unless input or output is positive. A zero or negative
/// total is replaced with `input + output`, saturating at `i64::MAX`.
pub fn build_usage(
    input: i64,
    output: i64,
    total: i64,
    cache_read: Option<i64>,
    cache_creation: Option<i64>,
) -> Option<TokenUsage> {
    if input <= 0 && output <= 0 {
        return None;
    }
    let (input, output) = (input.max(0), output.max(0));
    let total = if total <= 0 {
        input.saturating_add(output)
    } else {
        total
    };
    Some(TokenUsage {
        event_id: 0,
        input_tokens: input,
        output_tokens: output,
        total_tokens: total,
        cache_read_tokens: cache_read,
        cache_creation_tokens: cache_creation,
        model: None,
    })
}

/// Token usage from the first recognized shape in `data`, with the model
/// name attached when one is found.
pub fn parse_usage(data: &JsonValue) -> Option<TokenUsage> {
    let usage = USAGE_BLOCK_PATHS
        .iter()
        .filter_map(|path| get_path(data, *path))
        .filter(|block| block.is_object())
        .find_map(usage_from_block)
        .or_else(|| usage_from_text(data))?;

    Some(TokenUsage {
        model: model_name(data),
        ..usage
    })
}

/// Whether `data` carries a usage block at any recognized location
pub fn has_usage_block(data: &JsonValue) -> bool {
    USAGE_BLOCK_PATHS
        .iter()
        .any(|path| get_path(data, *path).is_some_and(JsonValue::is_object))
}

fn usage_from_block(block: &JsonValue) -> Option<TokenUsage> {
    let fields = extract_schema_fields(block, USAGE_FIELDS);
    let count = |name: &str| convert_opt::<i64>(fields.get(name));
    build_usage(
        count("input").unwrap_or(0),
        count("output").unwrap_or(0),
        count("total").unwrap_or(0),
        count("cache_read"),
        count("cache_creation"),
    )
}

/// Counts embedded in a stringified message, e.g. a repr containing
/// `usage_metadata={'input_tokens': 10, 'output_tokens': 5}`. Both counts
/// must be present.
fn usage_from_text(data: &JsonValue) -> Option<TokenUsage> {
    let text = get_path(data, "response.text")?.as_str()?;
    let capture = |re: &Regex| -> Option<i64> { re.captures(text)?.get(1)?.as_str().parse().ok() };
    let input = capture(&INPUT_TOKENS_TEXT)?;
    let output = capture(&OUTPUT_TOKENS_TEXT)?;
    build_usage(input, output, 0, None, None)
}

/// First non-empty string at a known model-name location
pub fn model_name(data: &JsonValue) -> Option<String> {
    first_string(data, MODEL_NAME_PATHS).filter(|name| name != "None")
}

// ============================================================================
// RESPONSE TEXT
// ============================================================================

/// Text of an LLM response.
///
/// Tries, in order: `response.text` (unwrapping the legacy tuple form),
/// `response.message.content` (object or repr string), Anthropic-style
/// `response.content` blocks, and OpenAI-style `response.choices[0]`.
pub fn response_text(data: &JsonValue) -> Option<String> {
    let response = get_path(data, "response")?;

    if let Some(text) = response.get("text").and_then(JsonValue::as_str) {
        let text = unwrap_text_tuple(text);
        if !text.is_empty() {
            return Some(text);
        }
    }

    match response.get("message") {
        Some(JsonValue::Object(message)) => {
            if let Some(content) = message
                .get("content")
                .and_then(JsonValue::as_str)
                .filter(|c| !c.is_empty())
            {
                return Some(content.to_string());
            }
        }
        Some(JsonValue::String(repr)) => {
            if let Some(m) = MESSAGE_CONTENT_REPR.captures(repr).and_then(|c| c.get(1)) {
                return Some(m.as_str().to_string());
            }
        }
        _ => {}
    }

    if let Some(JsonValue::Array(blocks)) = response.get("content") {
        let joined = blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(JsonValue::as_str))
            .collect::<Vec<_>>()
            .join("\n");
        if !joined.is_empty() {
            return Some(joined);
        }
    }

    response
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|choice| {
            choice
                .get("message")
                .and_then(|m| m.get("content"))
                .or_else(|| choice.get("text"))
        })
        .and_then(JsonValue::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Unwrap `('text', "...")` to its inner string; other text is returned as is.
pub fn unwrap_text_tuple(text: &str) -> String {
    if !text.starts_with(TEXT_TUPLE_PREFIX) {
        return text.to_string();
    }
    if let Some(inner) = TEXT_TUPLE.captures(text).and_then(|c| c.get(1)) {
        return inner.as_str().to_string();
    }
    // Malformed tuple: scan from the first double quote
    let Some(start) = text.find('"') else {
        return text.to_string();
    };
    match text.rfind("\")") {
        Some(end) if end > start => text[start + 1..end].to_string(),
        _ => text[start + 1..].to_string(),
    }
}

/// Whitespace-separated word count
pub fn word_count(text: &str) -> i64 {
    i64::try_from(text.split_whitespace().count()).unwrap_or(i64::MAX)
}

// ============================================================================
// PROVIDER INFERENCE
// ============================================================================

/// Provider hinted by an SDK method path (`openai.chat.completions.create`)
pub fn provider_from_method(method: &str) -> Option<&'static str> {
    if contains_ascii_ignore_case(method, "openai") {
        Some("OpenAI")
    } else if contains_ascii_ignore_case(method, "anthropic") {
        Some("Anthropic")
    } else if contains_ascii_ignore_case(method, "cohere") {
        Some("Cohere")
    } else {
        None
    }
}

/// Provider implied by a model name (`gpt-4o`, `claude-3-haiku`, `command-r`)
pub fn provider_from_model(model: &str) -> Option<&'static str> {
    if contains_ascii_ignore_case(model, "gpt") {
        Some("OpenAI")
    } else if contains_ascii_ignore_case(model, "claude") {
        Some("Anthropic")
    } else if contains_ascii_ignore_case(model, "command") {
        Some("Cohere")
    } else {
        None
    }
}
