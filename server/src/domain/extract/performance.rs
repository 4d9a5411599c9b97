//! Latency metrics for event kinds without a dedicated extractor

use async_trait::async_trait;

use super::extractor::{ExtractError, Extractor};
use super::llm_call::{LLM_CALL_FINISH, call_duration_ms};
use super::model_response::MODEL_RESPONSE;
use crate::data::types::{Event, PerformanceMetric};
use crate::data::uow::UnitOfWork;

/// Kinds whose metric is staged by their own extractor, keeping one metric
/// per event
const OWNED_KINDS: &[&str] = &[LLM_CALL_FINISH, MODEL_RESPONSE];

pub struct PerformanceExtractor;

#[async_trait]
impl Extractor for PerformanceExtractor {
    fn name(&self) -> &'static str {
        "performance"
    }

    fn can_process(&self, event: &Event) -> bool {
        !OWNED_KINDS.contains(&event.event_type.as_str())
            && (event.duration_ms.is_some_and(|d| d > 0.0)
                || (event.event_type.ends_with("call_finish") && event.data.get("duration").is_some()))
    }

    async fn process(&self, event: &Event, uow: &mut UnitOfWork) -> Result<(), ExtractError> {
        if let Some(duration_ms) = call_duration_ms(event) {
            uow.add_performance_metric(PerformanceMetric {
                event_id: event.id,
                duration_ms,
                timestamp: event.timestamp,
            });
        }
        Ok(())
    }
}
