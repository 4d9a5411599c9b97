//! Repository trait for storage backends
//!
//! The extraction pipeline only talks to storage through `EventRepository`.
//! Reads are point lookups; every write goes through `commit`, which applies
//! one event's `ChangeSet` atomically.

use async_trait::async_trait;

use crate::data::error::DataError;
use crate::data::types::{Agent, Event, EventRecords, RecordCounts, RecordKind, Session};
use crate::data::uow::ChangeSet;

#[async_trait]
pub trait EventRepository: Send + Sync {
    // ==================== Event Operations ====================

    /// Durably stage an ingested event, assigning an id when `event.id == 0`
    async fn stage_event(&self, event: Event) -> Result<Event, DataError>;

    /// Get a single event by id
    async fn get_event(&self, event_id: i64) -> Result<Option<Event>, DataError>;

    /// Oldest-first unprocessed events, at most `limit`
    async fn list_unprocessed(&self, limit: usize) -> Result<Vec<Event>, DataError>;

    // ==================== Entity Lookups ====================

    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, DataError>;

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, DataError>;

    /// All sessions owned by an agent, in no particular order
    async fn list_sessions_for_agent(&self, agent_id: &str) -> Result<Vec<Session>, DataError>;

    /// Most recently started session of the agent that has no end time
    async fn latest_open_session_for_agent(
        &self,
        agent_id: &str,
    ) -> Result<Option<Session>, DataError> {
        let sessions = self.list_sessions_for_agent(agent_id).await?;
        Ok(latest_session(sessions.into_iter().filter(Session::is_open)))
    }

    /// Most recently started session of the agent regardless of state
    async fn latest_session_for_agent(&self, agent_id: &str) -> Result<Option<Session>, DataError> {
        let sessions = self.list_sessions_for_agent(agent_id).await?;
        Ok(latest_session(sessions.into_iter()))
    }

    // ==================== Derived Records ====================

    /// Whether a committed record of `kind` exists for the event
    async fn has_record(&self, event_id: i64, kind: RecordKind) -> Result<bool, DataError>;

    /// Every committed record derived from one event
    async fn records_for_event(&self, event_id: i64) -> Result<EventRecords, DataError>;

    async fn record_counts(&self) -> Result<RecordCounts, DataError>;

    // ==================== Unit of Work ====================

    /// Apply all staged changes for one event atomically.
    ///
    /// Fails with `DataError::Conflict` (and applies nothing) when a singleton
    /// record already exists for the event.
    async fn commit(&self, changes: &ChangeSet) -> Result<(), DataError>;
}

/// Pick the session with the greatest start time; ties keep the later one
pub fn latest_session(sessions: impl Iterator<Item = Session>) -> Option<Session> {
    sessions.fold(None, |best: Option<Session>, s| match best {
        Some(b) if b.start_time > s.start_time => Some(b),
        _ => Some(s),
    })
}
