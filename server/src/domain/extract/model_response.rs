//! `model_response`: usage, latency, response content and model identity

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use super::extractor::{ExtractError, Extractor};
use super::paths::{convert_opt, first_string, get_path};
use super::usage::{parse_usage, provider_from_method, provider_from_model, response_text, word_count};
use crate::data::types::{ContentAnalysis, Event, ModelDetails, PerformanceMetric};
use crate::data::uow::UnitOfWork;
use crate::utils::string::{extract_numeric_values, truncate_chars};

pub const MODEL_RESPONSE: &str = "model_response";

/// Stored response text is cut to this many characters
pub const MAX_CONTENT_CHARS: usize = 1000;

const CONTENT_TYPE_TEXT: &str = "text";

const RESPONSE_MODEL_PATHS: &[&str] = &[
    "response.llm_output.model",
    "response.llm_output.model_name",
    "response.model",
    "response.model_name",
];

pub struct ModelResponseExtractor;

#[async_trait]
impl Extractor for ModelResponseExtractor {
    fn name(&self) -> &'static str {
        "model_response"
    }

    fn can_process(&self, event: &Event) -> bool {
        event.event_type == MODEL_RESPONSE
    }

    async fn process(&self, event: &Event, uow: &mut UnitOfWork) -> Result<(), ExtractError> {
        if !event.data.is_object() {
            return Ok(());
        }

        if let Some(usage) = parse_usage(&event.data) {
            uow.add_token_usage(usage).await?;
        }

        if let Some(metric) = performance(event) {
            uow.add_performance_metric(metric);
        }

        match response_text(&event.data) {
            Some(text) => uow.add_content_analysis(ContentAnalysis {
                event_id: event.id,
                content_type: CONTENT_TYPE_TEXT.to_string(),
                content_text: truncate_chars(&text, MAX_CONTENT_CHARS),
                word_count: word_count(&text),
                sentiment_score: None,
                toxicity_score: None,
            }),
            None => tracing::trace!(event_id = event.id, "Model response without text"),
        }

        if let Some(details) = model_details(event) {
            uow.add_model_details(details).await?;
        }
        Ok(())
    }
}

/// Latency from `performance.duration_ms`, else the event's own duration.
///
/// String durations such as `"340.5ms"` are read by their first number.
fn performance(event: &Event) -> Option<PerformanceMetric> {
    let data = &event.data;
    let duration_ms = match get_path(data, "performance.duration_ms") {
        Some(JsonValue::String(s)) => extract_numeric_values(s).first().copied(),
        other => convert_opt::<f64>(other),
    }
    .or(event.duration_ms)
    .filter(|d| d.is_finite() && *d > 0.0)?;

    let timestamp = convert_opt::<DateTime<Utc>>(get_path(data, "performance.timestamp"))
        .unwrap_or(event.timestamp);

    Some(PerformanceMetric {
        event_id: event.id,
        duration_ms,
        timestamp,
    })
}

fn model_details(event: &Event) -> Option<ModelDetails> {
    let model_name = first_string(&event.data, RESPONSE_MODEL_PATHS)?;
    let model_provider = provider_from_model(&model_name)
        .or_else(|| provider_from_method(&model_name))
        .map(str::to_string);
    Some(ModelDetails {
        model_name: Some(model_name),
        model_provider,
        ..ModelDetails::new(event.id)
    })
}
