//! EventRepository trait implementation for SQLite

use async_trait::async_trait;

use crate::data::error::DataError;
use crate::data::traits::EventRepository;
use crate::data::types::{Agent, Event, EventRecords, RecordCounts, RecordKind, Session};
use crate::data::uow::ChangeSet;

use super::SqliteRepository;
use super::repositories::{commit, entities, events, records};

#[async_trait]
impl EventRepository for SqliteRepository {
    // ==================== Event Operations ====================

    async fn stage_event(&self, event: Event) -> Result<Event, DataError> {
        events::insert_event(self.pool(), event)
            .await
            .map_err(Into::into)
    }

    async fn get_event(&self, event_id: i64) -> Result<Option<Event>, DataError> {
        events::get_event(self.pool(), event_id)
            .await
            .map_err(Into::into)
    }

    async fn list_unprocessed(&self, limit: usize) -> Result<Vec<Event>, DataError> {
        events::list_unprocessed(self.pool(), limit)
            .await
            .map_err(Into::into)
    }

    // ==================== Entity Lookups ====================

    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, DataError> {
        entities::get_agent(self.pool(), agent_id)
            .await
            .map_err(Into::into)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, DataError> {
        entities::get_session(self.pool(), session_id)
            .await
            .map_err(Into::into)
    }

    async fn list_sessions_for_agent(&self, agent_id: &str) -> Result<Vec<Session>, DataError> {
        entities::list_sessions_for_agent(self.pool(), agent_id)
            .await
            .map_err(Into::into)
    }

    // ==================== Derived Records ====================

    async fn has_record(&self, event_id: i64, kind: RecordKind) -> Result<bool, DataError> {
        let mut conn = self.pool().acquire().await.map_err(DataError::from_sqlite)?;
        records::has_record(&mut conn, event_id, kind)
            .await
            .map_err(Into::into)
    }

    async fn records_for_event(&self, event_id: i64) -> Result<EventRecords, DataError> {
        records::records_for_event(self.pool(), event_id)
            .await
            .map_err(Into::into)
    }

    async fn record_counts(&self) -> Result<RecordCounts, DataError> {
        records::record_counts(self.pool())
            .await
            .map_err(Into::into)
    }

    // ==================== Unit of Work ====================

    async fn commit(&self, changes: &ChangeSet) -> Result<(), DataError> {
        commit::commit_changes(self.pool(), changes)
            .await
            .map_err(Into::into)
    }
}
