//! Token usage on event kinds without a dedicated extractor

use async_trait::async_trait;

use super::extractor::{ExtractError, Extractor};
use super::llm_call::LLM_CALL_FINISH;
use super::model_response::MODEL_RESPONSE;
use super::usage::{has_usage_block, parse_usage};
use crate::data::types::Event;
use crate::data::uow::UnitOfWork;

/// Kinds whose usage is staged by their own extractor
const OWNED_KINDS: &[&str] = &[LLM_CALL_FINISH, MODEL_RESPONSE];

pub struct TokenUsageExtractor;

#[async_trait]
impl Extractor for TokenUsageExtractor {
    fn name(&self) -> &'static str {
        "token_usage"
    }

    fn can_process(&self, event: &Event) -> bool {
        !OWNED_KINDS.contains(&event.event_type.as_str()) && has_usage_block(&event.data)
    }

    async fn process(&self, event: &Event, uow: &mut UnitOfWork) -> Result<(), ExtractError> {
        match parse_usage(&event.data) {
            Some(usage) => {
                uow.add_token_usage(usage).await?;
            }
            None => tracing::debug!(event_id = event.id, "Usage block without token counts"),
        }
        Ok(())
    }
}
