//! Tests for the event processor

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use super::*;
use crate::data::memory::MemoryRepository;
use crate::data::types::{
    Agent, EventRecords, RecordCounts, RecordKind, Session, TokenUsage,
};
use crate::data::uow::ChangeSet;
use crate::domain::extract::extractor::{ExtractError, Extractor, Phase};

const TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Test extractors
// ============================================================================

type CallLog = Arc<Mutex<Vec<&'static str>>>;

/// Records its invocation, optionally failing or staging token usage
struct Recorder {
    name: &'static str,
    phase: Phase,
    fail: bool,
    stage_usage: bool,
    calls: CallLog,
}

impl Recorder {
    fn new(name: &'static str, calls: &CallLog) -> Self {
        Self {
            name,
            phase: Phase::Specialized,
            fail: false,
            stage_usage: false,
            calls: Arc::clone(calls),
        }
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn universal(mut self) -> Self {
        self.phase = Phase::Universal;
        self
    }

    fn staging_usage(mut self) -> Self {
        self.stage_usage = true;
        self
    }
}

#[async_trait]
impl Extractor for Recorder {
    fn name(&self) -> &'static str {
        self.name
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn can_process(&self, _event: &Event) -> bool {
        true
    }

    async fn process(&self, _event: &Event, uow: &mut UnitOfWork) -> Result<(), ExtractError> {
        self.calls.lock().push(self.name);
        if self.fail {
            return Err(ExtractError::MissingField("data.response"));
        }
        if self.stage_usage {
            uow.add_token_usage(TokenUsage {
                input_tokens: 3,
                output_tokens: 4,
                total_tokens: 7,
                ..Default::default()
            })
            .await?;
        }
        Ok(())
    }
}

// ============================================================================
// Test repositories
// ============================================================================

#[derive(Clone, Copy)]
enum CommitMode {
    Fail,
    Hang,
}

/// Memory repository whose commit fails or hangs
struct FaultyRepo {
    inner: MemoryRepository,
    mode: CommitMode,
}

#[async_trait]
impl EventRepository for FaultyRepo {
    async fn stage_event(&self, event: Event) -> Result<Event, DataError> {
        self.inner.stage_event(event).await
    }

    async fn get_event(&self, event_id: i64) -> Result<Option<Event>, DataError> {
        self.inner.get_event(event_id).await
    }

    async fn list_unprocessed(&self, limit: usize) -> Result<Vec<Event>, DataError> {
        self.inner.list_unprocessed(limit).await
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, DataError> {
        self.inner.get_agent(agent_id).await
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, DataError> {
        self.inner.get_session(session_id).await
    }

    async fn list_sessions_for_agent(&self, agent_id: &str) -> Result<Vec<Session>, DataError> {
        self.inner.list_sessions_for_agent(agent_id).await
    }

    async fn has_record(&self, event_id: i64, kind: RecordKind) -> Result<bool, DataError> {
        self.inner.has_record(event_id, kind).await
    }

    async fn records_for_event(&self, event_id: i64) -> Result<EventRecords, DataError> {
        self.inner.records_for_event(event_id).await
    }

    async fn record_counts(&self) -> Result<RecordCounts, DataError> {
        self.inner.record_counts().await
    }

    async fn commit(&self, _changes: &ChangeSet) -> Result<(), DataError> {
        match self.mode {
            CommitMode::Fail => Err(DataError::Conflict("disk full".to_string())),
            CommitMode::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

async fn staged(repo: &Arc<dyn EventRepository>) -> Event {
    repo.stage_event(Event::new("agent-1", "LLM_call_finish", json!({"k": 1})))
        .await
        .unwrap()
}

fn processor(registry: ExtractorRegistry, repo: Arc<dyn EventRepository>) -> EventProcessor {
    EventProcessor::new(Arc::new(registry), repo, TIMEOUT)
}

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test]
async fn test_failing_extractor_is_isolated() {
    let calls: CallLog = Arc::default();
    let registry = ExtractorRegistry::builder()
        .register(Arc::new(Recorder::new("first", &calls)))
        .register(Arc::new(Recorder::new("middle", &calls).failing()))
        .register(Arc::new(Recorder::new("third", &calls)))
        .build();
    let repo: Arc<dyn EventRepository> = Arc::new(MemoryRepository::new());
    let mut event = staged(&repo).await;

    let report = processor(registry, repo.clone())
        .process_event(&mut event)
        .await
        .unwrap();

    assert_eq!(*calls.lock(), vec!["first", "middle", "third"]);
    assert_eq!(report.outcome, ProcessOutcome::Processed);
    assert_eq!(report.extractors_run, vec!["first", "middle", "third"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].extractor, "middle");
    assert_eq!(report.failures[0].error, "missing field `data.response`");
    assert!(!report.is_clean());

    assert!(event.processed);
    assert!(repo.get_event(event.id).await.unwrap().unwrap().processed);
}

#[tokio::test]
async fn test_universal_extractors_dispatched_first() {
    let calls: CallLog = Arc::default();
    let registry = ExtractorRegistry::builder()
        .register(Arc::new(Recorder::new("specialized", &calls)))
        .register(Arc::new(Recorder::new("common", &calls).universal()))
        .build();
    let repo: Arc<dyn EventRepository> = Arc::new(MemoryRepository::new());
    let mut event = staged(&repo).await;

    processor(registry, repo).process_event(&mut event).await.unwrap();

    assert_eq!(*calls.lock(), vec!["common", "specialized"]);
}

#[tokio::test]
async fn test_event_with_no_extractors_still_completes() {
    let repo: Arc<dyn EventRepository> = Arc::new(MemoryRepository::new());
    let mut event = staged(&repo).await;

    let report = processor(ExtractorRegistry::builder().build(), repo.clone())
        .process_event(&mut event)
        .await
        .unwrap();

    assert!(report.is_clean());
    assert!(report.extractors_run.is_empty());
    assert!(event.processed);
}

// ============================================================================
// Idempotency
// ============================================================================

#[tokio::test]
async fn test_reprocessing_is_skipped() {
    let calls: CallLog = Arc::default();
    let registry = ExtractorRegistry::builder()
        .register(Arc::new(Recorder::new("usage", &calls).staging_usage()))
        .build();
    let repo: Arc<dyn EventRepository> = Arc::new(MemoryRepository::new());
    let processor = processor(registry, repo.clone());
    let mut event = staged(&repo).await;

    processor.process_event(&mut event).await.unwrap();
    let again = processor.process_event(&mut event).await.unwrap();

    assert_eq!(again.outcome, ProcessOutcome::Skipped);
    assert_eq!(calls.lock().len(), 1);
    assert_eq!(repo.records_for_event(event.id).await.unwrap().token_usage.len(), 1);
}

#[tokio::test]
async fn test_stale_copy_is_skipped_using_stored_flag() {
    let calls: CallLog = Arc::default();
    let registry = ExtractorRegistry::builder()
        .register(Arc::new(Recorder::new("usage", &calls).staging_usage()))
        .build();
    let repo: Arc<dyn EventRepository> = Arc::new(MemoryRepository::new());
    let processor = processor(registry, repo.clone());
    let event = staged(&repo).await;

    let mut first = event.clone();
    let mut stale = event;
    processor.process_event(&mut first).await.unwrap();
    assert!(!stale.processed);

    let report = processor.process_event(&mut stale).await.unwrap();
    assert_eq!(report.outcome, ProcessOutcome::Skipped);
    assert_eq!(calls.lock().len(), 1);
}

// ============================================================================
// Commit failures
// ============================================================================

#[tokio::test]
async fn test_commit_failure_leaves_event_unprocessed() {
    let repo: Arc<dyn EventRepository> = Arc::new(FaultyRepo {
        inner: MemoryRepository::new(),
        mode: CommitMode::Fail,
    });
    let mut event = staged(&repo).await;
    let calls: CallLog = Arc::default();
    let registry = ExtractorRegistry::builder()
        .register(Arc::new(Recorder::new("any", &calls)))
        .build();

    let err = processor(registry, repo.clone())
        .process_event(&mut event)
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::Commit { .. }));
    assert_eq!(err.event_id(), event.id);
    assert!(!event.processed);
    assert!(!repo.get_event(event.id).await.unwrap().unwrap().processed);
}

#[tokio::test]
async fn test_commit_deadline() {
    let repo: Arc<dyn EventRepository> = Arc::new(FaultyRepo {
        inner: MemoryRepository::new(),
        mode: CommitMode::Hang,
    });
    let mut event = staged(&repo).await;
    let processor = EventProcessor::new(
        Arc::new(ExtractorRegistry::builder().build()),
        repo,
        Duration::from_millis(20),
    );

    let err = processor.process_event(&mut event).await.unwrap_err();

    match err {
        ProcessError::Deadline {
            event_id,
            timeout_ms,
        } => {
            assert_eq!(event_id, event.id);
            assert_eq!(timeout_ms, 20);
        }
        other => panic!("expected deadline, got {other:?}"),
    }
    assert!(!event.processed);
}

// ============================================================================
// Batches
// ============================================================================

#[tokio::test]
async fn test_sequential_batch_counts() {
    let calls: CallLog = Arc::default();
    let registry = ExtractorRegistry::builder()
        .register(Arc::new(Recorder::new("bad", &calls).failing()))
        .build();
    let repo: Arc<dyn EventRepository> = Arc::new(MemoryRepository::new());
    let mut events = vec![staged(&repo).await, staged(&repo).await];
    events[1].processed = true;

    let batch = processor(registry, repo).process_events(&mut events).await;

    assert_eq!(
        batch,
        BatchReport {
            processed: 1,
            skipped: 1,
            failed: 0,
            extractor_errors: 1,
        }
    );
    assert_eq!(batch.total(), 2);
    assert!(events[0].processed);
}

#[tokio::test]
async fn test_batch_continues_after_commit_failure() {
    let repo: Arc<dyn EventRepository> = Arc::new(FaultyRepo {
        inner: MemoryRepository::new(),
        mode: CommitMode::Fail,
    });
    let mut events = vec![staged(&repo).await, staged(&repo).await];

    let batch = processor(ExtractorRegistry::builder().build(), repo)
        .process_events(&mut events)
        .await;

    assert_eq!(batch.failed, 2);
    assert_eq!(batch.processed, 0);
}

#[tokio::test]
async fn test_concurrent_batch() {
    let calls: CallLog = Arc::default();
    let registry = ExtractorRegistry::builder()
        .register(Arc::new(Recorder::new("usage", &calls).staging_usage()))
        .build();
    let repo: Arc<dyn EventRepository> = Arc::new(MemoryRepository::new());
    let mut events = Vec::new();
    for _ in 0..8 {
        events.push(staged(&repo).await);
    }

    let batch = processor(registry, repo.clone())
        .process_events_concurrent(events, 3)
        .await;

    assert_eq!(batch.processed, 8);
    assert_eq!(calls.lock().len(), 8);
    let counts = repo.record_counts().await.unwrap();
    assert_eq!(counts.token_usage, 8);
    assert_eq!(counts.unprocessed_events, 0);
}
