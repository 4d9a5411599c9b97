//! Event extraction pipeline
//!
//! Turns raw telemetry events into typed records:
//! - `paths` - Null-safe JSON path lookup, coercion and schema hunting
//! - `extractor` - The `Extractor` trait, execution phases and errors
//! - `registry` - Extractor lookup by event kind
//! - `processor` - Per-event dispatch, fault isolation and commit
//! - `usage` - Token usage and response text shapes shared by extractors
//!
//! Concrete extractors live one per file. [`default_registry`] is the single
//! place where they are assembled.

pub mod common;
pub mod extractor;
pub mod framework;
pub mod llm_call;
pub mod model_request;
pub mod model_response;
pub mod monitor;
pub mod paths;
pub mod performance;
pub mod processor;
pub mod registry;
pub mod security;
pub mod token_usage;
pub mod usage;

use std::sync::Arc;

pub use common::CommonExtractor;
pub use extractor::{ExtractError, Extractor, Phase};
pub use framework::{FRAMEWORK_PATCH, FrameworkExtractor};
pub use llm_call::LLMCallExtractor;
pub use model_request::{MODEL_REQUEST, ModelRequestExtractor};
pub use model_response::{MODEL_RESPONSE, ModelResponseExtractor};
pub use monitor::MonitorEventExtractor;
pub use performance::PerformanceExtractor;
pub use processor::{
    BatchReport, EventProcessor, ExtractorFailure, ProcessError, ProcessOutcome, ProcessReport,
};
pub use registry::{ExtractorRegistry, RegistryBuilder};
pub use security::SecurityExtractor;
pub use token_usage::TokenUsageExtractor;

/// The full extractor set in dispatch order.
///
/// Common is the only universal extractor. Kind-specific extractors are
/// indexed by kind; the structural ones are probed for every event.
pub fn default_registry() -> ExtractorRegistry {
    ExtractorRegistry::builder()
        .register(Arc::new(CommonExtractor))
        .register_for_event_kinds(MonitorEventExtractor::KINDS, Arc::new(MonitorEventExtractor))
        .register_for_event_kinds(LLMCallExtractor::KINDS, Arc::new(LLMCallExtractor))
        .register_for_event_kind(MODEL_REQUEST, Arc::new(ModelRequestExtractor))
        .register_for_event_kind(MODEL_RESPONSE, Arc::new(ModelResponseExtractor))
        .register(Arc::new(FrameworkExtractor))
        .register_for_event_kind(FRAMEWORK_PATCH, Arc::new(FrameworkExtractor))
        .register(Arc::new(TokenUsageExtractor))
        .register(Arc::new(PerformanceExtractor))
        .register(Arc::new(SecurityExtractor))
        .build()
}
