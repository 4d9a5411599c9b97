//! `LLM_call_start` / `LLM_call_finish` / `LLM_call_blocked`
//!
//! | Kind    | Records                                               |
//! |---------|-------------------------------------------------------|
//! | start   | ModelDetails (method hint), SecurityAlert (alert tag) |
//! | finish  | TokenUsage, PerformanceMetric, ModelDetails (response)|
//! | blocked | SecurityAlert (reason or tag), ModelDetails           |

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use super::extractor::{ExtractError, Extractor};
use super::paths::{convert_opt, get_path, string_at};
use super::security::tag_alert;
use super::usage::{model_name, parse_usage, provider_from_method, provider_from_model};
use crate::data::types::{Event, ModelDetails, PerformanceMetric, SecurityAlert, Severity};
use crate::data::uow::UnitOfWork;

pub const LLM_CALL_START: &str = "LLM_call_start";
pub const LLM_CALL_FINISH: &str = "LLM_call_finish";
pub const LLM_CALL_BLOCKED: &str = "LLM_call_blocked";

const DEFAULT_MODEL_TYPE: &str = "chat";

pub struct LLMCallExtractor;

impl LLMCallExtractor {
    pub const KINDS: &'static [&'static str] = &[LLM_CALL_START, LLM_CALL_FINISH, LLM_CALL_BLOCKED];
}

#[async_trait]
impl Extractor for LLMCallExtractor {
    fn name(&self) -> &'static str {
        "llm_call"
    }

    fn can_process(&self, event: &Event) -> bool {
        Self::KINDS.contains(&event.event_type.as_str())
    }

    async fn process(&self, event: &Event, uow: &mut UnitOfWork) -> Result<(), ExtractError> {
        if !event.data.is_object() {
            tracing::debug!(event_id = event.id, "LLM call event without object payload");
            return Ok(());
        }

        match event.event_type.as_str() {
            LLM_CALL_START => {
                stage_model_details(uow, request_model_details(event)).await?;
                if let Some(alert) = alert_tag(event).and_then(|tag| tag_alert(event, tag)) {
                    uow.add_security_alert(alert);
                }
            }
            LLM_CALL_FINISH => {
                if let Some(usage) = parse_usage(&event.data) {
                    uow.add_token_usage(usage).await?;
                }
                if let Some(duration_ms) = call_duration_ms(event) {
                    uow.add_performance_metric(PerformanceMetric {
                        event_id: event.id,
                        duration_ms,
                        timestamp: event.timestamp,
                    });
                }
                stage_model_details(uow, response_model_details(event)).await?;
            }
            LLM_CALL_BLOCKED => {
                if let Some(alert) = blocked_alert(event) {
                    uow.add_security_alert(alert);
                }
                stage_model_details(uow, request_model_details(event)).await?;
            }
            _ => {}
        }
        Ok(())
    }
}

async fn stage_model_details(
    uow: &mut UnitOfWork,
    details: Option<ModelDetails>,
) -> Result<(), ExtractError> {
    if let Some(details) = details {
        uow.add_model_details(details).await?;
    }
    Ok(())
}

fn alert_tag(event: &Event) -> Option<&str> {
    get_path(&event.data, "alert").and_then(JsonValue::as_str)
}

// ============================================================================
// MODEL DETAILS
// ============================================================================

/// Model details from a request-side payload: provider from the SDK method,
/// name from `model` or the last prompt message.
fn request_model_details(event: &Event) -> Option<ModelDetails> {
    let data = &event.data;
    let model_name = model_name(data).or_else(|| {
        get_path(data, "prompt")
            .and_then(JsonValue::as_array)
            .and_then(|messages| messages.last())
            .and_then(|last| last.get("model"))
            .and_then(JsonValue::as_str)
            .map(str::to_string)
    });
    let provider = string_at(data, "method")
        .as_deref()
        .and_then(provider_from_method)
        .or_else(|| model_name.as_deref().and_then(provider_from_model));

    if model_name.is_none() && provider.is_none() {
        return None;
    }
    Some(ModelDetails {
        model_name,
        model_provider: provider.map(str::to_string),
        model_type: Some(DEFAULT_MODEL_TYPE.to_string()),
        ..ModelDetails::new(event.id)
    })
}

/// Model details from `data.response`: name from `response.model`, type from
/// the response structure, provider from the name.
fn response_model_details(event: &Event) -> Option<ModelDetails> {
    let response = get_path(&event.data, "response")?;
    let model_name = response
        .get("model")
        .and_then(JsonValue::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_string);
    let model_type = if response.get("content").is_some_and(JsonValue::is_array) {
        "chat"
    } else if response.get("text").is_some() {
        "completion"
    } else {
        DEFAULT_MODEL_TYPE
    };
    let provider = model_name.as_deref().and_then(provider_from_model);

    if model_name.is_none() && provider.is_none() {
        return None;
    }
    Some(ModelDetails {
        model_name,
        model_provider: provider.map(str::to_string),
        model_type: Some(model_type.to_string()),
        ..ModelDetails::new(event.id)
    })
}

// ============================================================================
// PERFORMANCE
// ============================================================================

/// Positive call duration: the event's own `duration_ms`, then
/// `data.duration` in seconds, then `data.performance.duration_ms`.
pub fn call_duration_ms(event: &Event) -> Option<f64> {
    let data = &event.data;
    event
        .duration_ms
        .filter(|d| *d > 0.0)
        .or_else(|| convert_opt::<f64>(get_path(data, "duration")).map(|secs| secs * 1000.0))
        .or_else(|| convert_opt::<f64>(get_path(data, "performance.duration_ms")))
        .filter(|d| d.is_finite() && *d > 0.0)
}

// ============================================================================
// BLOCKED CALLS
// ============================================================================

fn blocked_alert(event: &Event) -> Option<SecurityAlert> {
    match string_at(&event.data, "reason") {
        Some(reason) => Some(SecurityAlert {
            event_id: event.id,
            alert_type: "blocked".to_string(),
            severity: Severity::High,
            description: format!("LLM call blocked: {}", reason),
            field_path: None,
            timestamp: event.timestamp,
        }),
        None => alert_tag(event).and_then(|tag| tag_alert(event, tag)),
    }
}

#[cfg(test)]
#[path = "llm_call_tests.rs"]
mod tests;
