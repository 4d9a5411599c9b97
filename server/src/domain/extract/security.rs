//! Security alerts from check trees and prompt text
//!
//! Two sources, both multi-valued:
//! - `data.security`: the top-level `alert_level` and every node under
//!   `field_checks` whose `alert_level` is not `none`, keyed by dotted path
//! - prompt text (`data.prompt` / `data.prompts`): one alert per entry that
//!   contains a denylisted keyword
//!
//! Alert tags set directly on LLM calls (`data.alert`) belong to the LLM call
//! extractor, which builds them through [`tag_alert`].

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};

use super::extractor::{ExtractError, Extractor};
use super::paths::get_path;
use crate::data::types::{Event, SecurityAlert, Severity};
use crate::data::uow::UnitOfWork;
use crate::utils::string::normalize_string;

/// Alert level meaning "checked, nothing found"
const NO_ALERT: &str = "none";

/// Matched against normalized prompt text
const SENSITIVE_KEYWORDS: &[&str] = &[
    "password",
    "secret",
    "token",
    "api key",
    "credential",
    "exploit",
    "hack",
    "bypass",
    "vulnerability",
];

/// Tag assigned to keyword hits
const KEYWORD_ALERT: &str = "suspicious";

/// Build an alert from a free-form tag such as `suspicious` or `dangerous`.
///
/// Returns `None` for an empty tag or the `none` sentinel.
pub fn tag_alert(event: &Event, tag: &str) -> Option<SecurityAlert> {
    let tag = tag.trim();
    if tag.is_empty() || tag.eq_ignore_ascii_case(NO_ALERT) {
        return None;
    }
    let description = match tag.to_ascii_lowercase().as_str() {
        "dangerous" | "critical" => "Potentially harmful content detected".to_string(),
        "suspicious" => "Suspicious pattern detected".to_string(),
        _ => format!("Alert: {}", tag),
    };
    Some(SecurityAlert {
        event_id: event.id,
        alert_type: tag.to_string(),
        severity: Severity::from_alert_tag(tag),
        description,
        field_path: None,
        timestamp: event.timestamp,
    })
}

pub struct SecurityExtractor;

#[async_trait]
impl Extractor for SecurityExtractor {
    fn name(&self) -> &'static str {
        "security"
    }

    fn can_process(&self, event: &Event) -> bool {
        get_path(&event.data, "security").is_some_and(JsonValue::is_object)
            || prompt_entries(&event.data).next().is_some()
    }

    async fn process(&self, event: &Event, uow: &mut UnitOfWork) -> Result<(), ExtractError> {
        for (path, text) in prompt_entries(&event.data) {
            if let Some(alert) = keyword_alert(event, &path, &text) {
                uow.add_security_alert(alert);
            }
        }

        let Some(security) = get_path(&event.data, "security").and_then(JsonValue::as_object)
        else {
            return Ok(());
        };

        if let Some(alert) = check_alert(event, security, None) {
            uow.add_security_alert(alert);
        }

        match security.get("field_checks") {
            None | Some(JsonValue::Null) => Ok(()),
            Some(JsonValue::Object(checks)) => {
                let mut alerts = Vec::new();
                walk_field_checks(event, checks, "", &mut alerts);
                for alert in alerts {
                    uow.add_security_alert(alert);
                }
                Ok(())
            }
            Some(_) => Err(ExtractError::InvalidShape {
                field: "data.security.field_checks",
                expected: "object",
            }),
        }
    }
}

// ============================================================================
// CHECK TREES
// ============================================================================

/// Alert for a node carrying a non-`none` `alert_level`
fn check_alert(
    event: &Event,
    node: &Map<String, JsonValue>,
    field_path: Option<&str>,
) -> Option<SecurityAlert> {
    let level = node.get("alert_level")?.as_str()?.trim();
    if level.is_empty() || level.eq_ignore_ascii_case(NO_ALERT) {
        return None;
    }
    let severity = node
        .get("severity")
        .and_then(JsonValue::as_str)
        .map(Severity::parse)
        .unwrap_or_else(|| Severity::from_alert_tag(level));
    let description = node
        .get("description")
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| match field_path {
            Some(path) => format!("Security check flagged `{}`", path),
            None => "Security check flagged event".to_string(),
        });

    Some(SecurityAlert {
        event_id: event.id,
        alert_type: level.to_string(),
        severity,
        description,
        field_path: field_path.map(str::to_string),
        timestamp: event.timestamp,
    })
}

/// Depth-first walk; a node may both carry a level and nest further checks
fn walk_field_checks(
    event: &Event,
    checks: &Map<String, JsonValue>,
    prefix: &str,
    out: &mut Vec<SecurityAlert>,
) {
    for (key, child) in checks {
        let JsonValue::Object(node) = child else {
            continue;
        };
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        if let Some(alert) = check_alert(event, node, Some(&path)) {
            out.push(alert);
        }
        walk_field_checks(event, node, &path, out);
    }
}

// ============================================================================
// PROMPT SCAN
// ============================================================================

/// `(field_path, text)` for every prompt entry with text
fn prompt_entries(data: &JsonValue) -> impl Iterator<Item = (String, String)> + '_ {
    ["prompt", "prompts"].into_iter().flat_map(move |key| {
        let entries: Vec<(String, String)> = match get_path(data, key) {
            Some(JsonValue::String(text)) => vec![(key.to_string(), text.clone())],
            Some(JsonValue::Array(items)) => items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| entry_text(item).map(|t| (format!("{}.{}", key, i), t)))
                .collect(),
            _ => Vec::new(),
        };
        entries.into_iter()
    })
}

/// Text of one prompt entry: a string, a message's string content, or the
/// joined text blocks of a message's content list
fn entry_text(entry: &JsonValue) -> Option<String> {
    match entry {
        JsonValue::String(text) => Some(text.clone()),
        JsonValue::Object(message) => match message.get("content")? {
            JsonValue::String(text) => Some(text.clone()),
            JsonValue::Array(blocks) => {
                let joined = blocks
                    .iter()
                    .filter_map(|b| b.get("text").and_then(JsonValue::as_str))
                    .collect::<Vec<_>>()
                    .join(" ");
                (!joined.is_empty()).then_some(joined)
            }
            _ => None,
        },
        _ => None,
    }
}

fn keyword_alert(event: &Event, path: &str, text: &str) -> Option<SecurityAlert> {
    let normalized = normalize_string(text);
    let keyword = SENSITIVE_KEYWORDS
        .iter()
        .find(|kw| normalized.contains(**kw))?;
    Some(SecurityAlert {
        event_id: event.id,
        alert_type: KEYWORD_ALERT.to_string(),
        severity: Severity::from_alert_tag(KEYWORD_ALERT),
        description: format!("Sensitive keyword `{}` in prompt", keyword),
        field_path: Some(path.to_string()),
        timestamp: event.timestamp,
    })
}

#[cfg(test)]
#[path = "security_tests.rs"]
mod tests;
