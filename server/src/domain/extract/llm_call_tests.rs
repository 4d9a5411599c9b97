//! Tests for LLM call extraction

use std::sync::Arc;

use serde_json::json;

use super::*;
use crate::data::memory::MemoryRepository;
use crate::data::traits::EventRepository;
use crate::data::uow::ChangeSet;

async fn extract(event: Event) -> ChangeSet {
    let repo: Arc<dyn EventRepository> = Arc::new(MemoryRepository::new());
    let event = repo.stage_event(event).await.unwrap();
    let mut uow = UnitOfWork::begin(repo, event.id);
    LLMCallExtractor.process(&event, &mut uow).await.unwrap();
    uow.changes().clone()
}

// ============================================================================
// LLM_call_start
// ============================================================================

#[tokio::test]
async fn test_start_with_suspicious_tag() {
    let changes = extract(Event::new(
        "agent-1",
        LLM_CALL_START,
        json!({
            "method": "messages.create",
            "prompt": [{"role": "user", "content": "..."}],
            "alert": "suspicious"
        }),
    ))
    .await;

    assert_eq!(changes.security_alerts.len(), 1);
    let alert = &changes.security_alerts[0];
    assert_eq!(alert.alert_type, "suspicious");
    assert_eq!(alert.severity, Severity::Medium);
    assert_eq!(alert.description, "Suspicious pattern detected");
    // Neither the method nor the prompt names a provider or model
    assert!(changes.model_details.is_none());
}

#[tokio::test]
async fn test_start_none_tag_suppressed() {
    let changes = extract(Event::new(
        "agent-1",
        LLM_CALL_START,
        json!({"method": "messages.create", "alert": "none"}),
    ))
    .await;
    assert!(changes.security_alerts.is_empty());

    let changes = extract(Event::new(
        "agent-1",
        LLM_CALL_START,
        json!({"method": "messages.create", "alert": "None"}),
    ))
    .await;
    assert!(changes.security_alerts.is_empty());
}

#[tokio::test]
async fn test_start_provider_from_method() {
    let changes = extract(Event::new(
        "agent-1",
        LLM_CALL_START,
        json!({"method": "anthropic.messages.create", "prompt": [{"role": "user", "content": "hi"}]}),
    ))
    .await;

    let details = changes.model_details.unwrap();
    assert_eq!(details.model_provider.as_deref(), Some("Anthropic"));
    assert_eq!(details.model_name, None);
    assert_eq!(details.model_type.as_deref(), Some("chat"));
}

#[tokio::test]
async fn test_start_model_from_last_prompt_message() {
    let changes = extract(Event::new(
        "agent-1",
        LLM_CALL_START,
        json!({"method": "chat.create", "prompt": [{"role": "user", "content": "hi", "model": "gpt-4o"}]}),
    ))
    .await;

    let details = changes.model_details.unwrap();
    assert_eq!(details.model_name.as_deref(), Some("gpt-4o"));
    assert_eq!(details.model_provider.as_deref(), Some("OpenAI"));
}

// ============================================================================
// LLM_call_finish
// ============================================================================

#[tokio::test]
async fn test_finish_anthropic_response() {
    let changes = extract(Event::new(
        "agent-1",
        LLM_CALL_FINISH,
        json!({
            "response": {
                "model": "claude-3-haiku-20240307",
                "usage": {"input_tokens": 10, "output_tokens": 50, "total_tokens": 60}
            }
        }),
    ))
    .await;

    let usage = changes.token_usage.unwrap();
    assert_eq!(
        (usage.input_tokens, usage.output_tokens, usage.total_tokens),
        (10, 50, 60)
    );
    assert_eq!(usage.model.as_deref(), Some("claude-3-haiku-20240307"));

    let details = changes.model_details.unwrap();
    assert_eq!(details.model_name.as_deref(), Some("claude-3-haiku-20240307"));
    assert_eq!(details.model_provider.as_deref(), Some("Anthropic"));
}

#[tokio::test]
async fn test_finish_cache_fields_and_duration() {
    let changes = extract(Event::new(
        "agent-1",
        LLM_CALL_FINISH,
        json!({
            "duration": 1.25,
            "response": {
                "model": "claude-3-5-sonnet",
                "content": [{"type": "text", "text": "ok"}],
                "usage": {
                    "input_tokens": 100,
                    "output_tokens": 20,
                    "cache_read_input_tokens": 80,
                    "cache_creation_input_tokens": 5
                }
            }
        }),
    ))
    .await;

    let usage = changes.token_usage.unwrap();
    assert_eq!(usage.total_tokens, 120);
    assert_eq!(usage.cache_read_tokens, Some(80));
    assert_eq!(usage.cache_creation_tokens, Some(5));

    assert_eq!(changes.performance_metrics.len(), 1);
    assert_eq!(changes.performance_metrics[0].duration_ms, 1250.0);
    assert_eq!(
        changes.model_details.unwrap().model_type.as_deref(),
        Some("chat")
    );
}

#[tokio::test]
async fn test_finish_openai_and_completion_shapes() {
    let changes = extract(Event::new(
        "agent-1",
        LLM_CALL_FINISH,
        json!({
            "performance": {"duration_ms": "340.5"},
            "response": {
                "model": "gpt-3.5-turbo-instruct",
                "text": "done",
                "usage": {"prompt_tokens": 4, "completion_tokens": 6}
            }
        }),
    ))
    .await;

    assert_eq!(changes.token_usage.unwrap().total_tokens, 10);
    assert_eq!(changes.performance_metrics[0].duration_ms, 340.5);
    let details = changes.model_details.unwrap();
    assert_eq!(details.model_type.as_deref(), Some("completion"));
    assert_eq!(details.model_provider.as_deref(), Some("OpenAI"));
}

#[tokio::test]
async fn test_finish_without_usage_or_duration() {
    let changes = extract(Event::new(
        "agent-1",
        LLM_CALL_FINISH,
        json!({"response": {"usage": {"input_tokens": 0, "output_tokens": 0}}, "duration": 0}),
    ))
    .await;

    assert!(changes.token_usage.is_none());
    assert!(changes.performance_metrics.is_empty());
    assert!(changes.model_details.is_none());
}

#[test]
fn test_call_duration_prefers_event_field() {
    let event = Event::new("a", LLM_CALL_FINISH, json!({"duration": 2})).with_duration_ms(15.0);
    assert_eq!(call_duration_ms(&event), Some(15.0));

    let event = Event::new("a", LLM_CALL_FINISH, json!({"duration": 2})).with_duration_ms(0.0);
    assert_eq!(call_duration_ms(&event), Some(2000.0));

    let event = Event::new("a", LLM_CALL_FINISH, json!({"duration": -1}));
    assert_eq!(call_duration_ms(&event), None);
}

// ============================================================================
// LLM_call_blocked
// ============================================================================

#[tokio::test]
async fn test_blocked_with_reason() {
    let changes = extract(Event::new(
        "agent-1",
        LLM_CALL_BLOCKED,
        json!({"reason": "policy violation", "alert": "suspicious", "method": "openai.chat.completions.create"}),
    ))
    .await;

    assert_eq!(changes.security_alerts.len(), 1);
    let alert = &changes.security_alerts[0];
    assert_eq!(alert.alert_type, "blocked");
    assert_eq!(alert.severity, Severity::High);
    assert_eq!(alert.description, "LLM call blocked: policy violation");
    assert_eq!(
        changes.model_details.unwrap().model_provider.as_deref(),
        Some("OpenAI")
    );
}

#[tokio::test]
async fn test_blocked_without_reason_uses_tag() {
    let changes = extract(Event::new(
        "agent-1",
        LLM_CALL_BLOCKED,
        json!({"alert": "dangerous"}),
    ))
    .await;

    assert_eq!(changes.security_alerts[0].severity, Severity::High);
    assert_eq!(changes.security_alerts[0].alert_type, "dangerous");
}

// ============================================================================
// Shape tolerance
// ============================================================================

#[tokio::test]
async fn test_non_object_payload_is_noop() {
    let changes = extract(Event::new("agent-1", LLM_CALL_FINISH, json!("raw"))).await;
    assert_eq!(changes.record_count(), 0);
}

#[test]
fn test_can_process() {
    for kind in LLMCallExtractor::KINDS {
        assert!(LLMCallExtractor.can_process(&Event::new("a", *kind, json!({}))));
    }
    assert!(!LLMCallExtractor.can_process(&Event::new("a", "model_response", json!({}))));
}
