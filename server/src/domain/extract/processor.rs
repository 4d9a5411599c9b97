//! Event processor
//!
//! Orchestrates extraction for one event:
//!
//! ```text
//! ┌────────────┐   ┌─────────────────────────────┐   ┌──────────────┐
//! │ Unprocessed│──▶│ Dispatching                 │──▶│ Processed    │
//! │            │   │ universal, then specialized │   │ (committed)  │
//! └────────────┘   └─────────────────────────────┘   └──────────────┘
//! ```
//!
//! Extractors run sequentially; one failing never stops its siblings. The
//! processed flag is staged in the unit of work and only set on the caller's
//! `Event` once the commit succeeds. An event already processed (in memory or
//! in storage) is skipped.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;

use super::registry::ExtractorRegistry;
use crate::data::error::DataError;
use crate::data::traits::EventRepository;
use crate::data::types::Event;
use crate::data::uow::UnitOfWork;

// ============================================================================
// REPORTS
// ============================================================================

/// One extractor's isolated failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorFailure {
    pub extractor: &'static str,
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Extractors ran and the unit of work committed
    Processed,
    /// The event was already processed; nothing ran
    Skipped,
}

/// Result of processing one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    pub event_id: i64,
    pub outcome: ProcessOutcome,
    pub extractors_run: Vec<&'static str>,
    pub failures: Vec<ExtractorFailure>,
}

impl ProcessReport {
    fn skipped(event_id: i64) -> Self {
        Self {
            event_id,
            outcome: ProcessOutcome::Skipped,
            extractors_run: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Processed with every extractor succeeding
    pub fn is_clean(&self) -> bool {
        self.outcome == ProcessOutcome::Processed && self.failures.is_empty()
    }
}

/// Aggregate counts for a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: usize,
    pub skipped: usize,
    /// Events whose commit failed or timed out
    pub failed: usize,
    /// Isolated extractor failures across all processed events
    pub extractor_errors: usize,
}

impl BatchReport {
    fn record(&mut self, result: &Result<ProcessReport, ProcessError>) {
        match result {
            Ok(report) => {
                match report.outcome {
                    ProcessOutcome::Processed => self.processed += 1,
                    ProcessOutcome::Skipped => self.skipped += 1,
                }
                self.extractor_errors += report.failures.len();
            }
            Err(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.failed
    }

    /// Fold another batch's counts into this one
    pub fn merge(&mut self, other: BatchReport) {
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.extractor_errors += other.extractor_errors;
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Failures that surface to the processor's caller
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("commit failed for event {event_id}: {source}")]
    Commit {
        event_id: i64,
        #[source]
        source: DataError,
    },

    #[error("commit for event {event_id} exceeded {timeout_ms}ms")]
    Deadline { event_id: i64, timeout_ms: u64 },

    /// The processed-state lookup before dispatch failed
    #[error("lookup failed for event {event_id}: {source}")]
    Lookup {
        event_id: i64,
        #[source]
        source: DataError,
    },
}

impl ProcessError {
    pub fn event_id(&self) -> i64 {
        match self {
            Self::Commit { event_id, .. }
            | Self::Deadline { event_id, .. }
            | Self::Lookup { event_id, .. } => *event_id,
        }
    }
}

// ============================================================================
// PROCESSOR
// ============================================================================

/// Dispatches registered extractors to events and commits their output
pub struct EventProcessor {
    registry: Arc<ExtractorRegistry>,
    repo: Arc<dyn EventRepository>,
    commit_timeout: Duration,
}

impl EventProcessor {
    pub fn new(
        registry: Arc<ExtractorRegistry>,
        repo: Arc<dyn EventRepository>,
        commit_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            repo,
            commit_timeout,
        }
    }

    pub fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    pub fn repository(&self) -> Arc<dyn EventRepository> {
        Arc::clone(&self.repo)
    }

    /// Run every applicable extractor against `event`, staging into `uow`.
    ///
    /// Never fails: extractor errors are collected into the report.
    pub async fn dispatch(&self, event: &Event, uow: &mut UnitOfWork) -> ProcessReport {
        let selected = self.registry.extractors_for_event(event);
        let mut extractors_run = Vec::with_capacity(selected.len());
        let mut failures = Vec::new();

        for extractor in selected {
            extractors_run.push(extractor.name());
            if let Err(e) = extractor.process(event, uow).await {
                tracing::warn!(
                    event_id = event.id,
                    event_type = %event.event_type,
                    extractor = extractor.name(),
                    error = %e,
                    "Extractor failed"
                );
                failures.push(ExtractorFailure {
                    extractor: extractor.name(),
                    error: e.to_string(),
                });
            }
        }

        uow.mark_processed();

        ProcessReport {
            event_id: event.id,
            outcome: ProcessOutcome::Processed,
            extractors_run,
            failures,
        }
    }

    /// Process one event in a fresh unit of work
    pub async fn process_event(&self, event: &mut Event) -> Result<ProcessReport, ProcessError> {
        let uow = UnitOfWork::begin(Arc::clone(&self.repo), event.id);
        self.process_event_with(event, uow).await
    }

    /// Process one event inside a caller-provided unit of work
    pub async fn process_event_with(
        &self,
        event: &mut Event,
        mut uow: UnitOfWork,
    ) -> Result<ProcessReport, ProcessError> {
        if self.already_processed(event).await? {
            tracing::debug!(event_id = event.id, "Event already processed, skipping");
            uow.rollback();
            return Ok(ProcessReport::skipped(event.id));
        }

        let report = self.dispatch(event, &mut uow).await;

        let changes = match tokio::time::timeout(self.commit_timeout, uow.commit()).await {
            Ok(Ok(changes)) => changes,
            Ok(Err(source)) => {
                tracing::error!(event_id = event.id, error = %source, "Failed to commit event");
                return Err(ProcessError::Commit {
                    event_id: event.id,
                    source,
                });
            }
            Err(_) => {
                let timeout_ms = u64::try_from(self.commit_timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::error!(event_id = event.id, timeout_ms, "Commit deadline exceeded");
                return Err(ProcessError::Deadline {
                    event_id: event.id,
                    timeout_ms,
                });
            }
        };

        if let Some(caller) = &changes.caller {
            event.apply_caller(caller);
        }
        event.mark_processed();

        tracing::debug!(
            event_id = event.id,
            event_type = %event.event_type,
            extractors = report.extractors_run.len(),
            failures = report.failures.len(),
            records = changes.record_count(),
            "Event processed"
        );

        Ok(report)
    }

    async fn already_processed(&self, event: &Event) -> Result<bool, ProcessError> {
        if event.processed {
            return Ok(true);
        }
        let stored = self
            .repo
            .get_event(event.id)
            .await
            .map_err(|source| ProcessError::Lookup {
                event_id: event.id,
                source,
            })?;
        Ok(stored.is_some_and(|e| e.processed))
    }

    /// Process events one after another; each commits independently
    pub async fn process_events(&self, events: &mut [Event]) -> BatchReport {
        let mut batch = BatchReport::default();
        for event in events.iter_mut() {
            let result = self.process_event(event).await;
            batch.record(&result);
        }
        log_batch(&batch);
        batch
    }

    /// Process events with up to `concurrency` in flight.
    ///
    /// Extraction within one event stays sequential.
    pub async fn process_events_concurrent(
        &self,
        events: Vec<Event>,
        concurrency: usize,
    ) -> BatchReport {
        let results: Vec<Result<ProcessReport, ProcessError>> =
            futures::stream::iter(events.into_iter().map(|mut event| async move {
                self.process_event(&mut event).await
            }))
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let mut batch = BatchReport::default();
        for result in &results {
            batch.record(result);
        }
        log_batch(&batch);
        batch
    }
}

fn log_batch(batch: &BatchReport) {
    tracing::info!(
        processed = batch.processed,
        skipped = batch.skipped,
        failed = batch.failed,
        extractor_errors = batch.extractor_errors,
        "Batch complete"
    );
}

#[cfg(test)]
#[path = "processor_tests.rs"]
mod tests;
