//! Per-event unit of work
//!
//! Extractors never write to storage directly. They stage records and entity
//! upserts in a `UnitOfWork`, which the processor commits once all extractors
//! have run. Reads go to the staged state first and fall back to the
//! repository, so a later extractor sees what an earlier one staged.
//!
//! Singleton kinds (`ModelDetails`, `TokenUsage`, `FrameworkDetails`) are held
//! in `Option` slots and are refused when either a staged or a committed row
//! already exists for the event.
//!
//! Agents and sessions are shared between events that may commit
//! concurrently, so backends merge them into the stored row instead of
//! overwriting it: sighting windows only widen, event counts are added, a
//! close is never undone and only the metadata keys written here change.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};

use crate::data::error::DataError;
use crate::data::traits::{EventRepository, latest_session};
use crate::data::types::{
    Agent, CallerSite, ContentAnalysis, FrameworkDetails, ModelDetails, PerformanceMetric,
    RecordKind, SecurityAlert, Session, TokenUsage,
};

/// One session upsert
#[derive(Debug, Clone, PartialEq)]
pub struct SessionChange {
    /// The session as this unit of work sees it. Inserted as-is (with
    /// `event_count` as its total) when no row exists yet.
    pub session: Session,
    /// Events this unit of work adds to `total_events`
    pub event_count: i64,
    /// Metadata keys this unit of work writes
    pub metadata: Map<String, JsonValue>,
}

impl SessionChange {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            event_count: 0,
            metadata: Map::new(),
        }
    }

    /// Row to insert when the session is not stored yet
    pub fn new_row(&self) -> Session {
        Session {
            total_events: self.event_count,
            ..self.session.clone()
        }
    }

    /// Apply this change to the stored row
    pub fn merge_into(&self, stored: &mut Session) {
        stored.start_time = stored.start_time.min(self.session.start_time);
        stored.end_time = stored.end_time.max(self.session.end_time);
        stored.total_events = stored.total_events.saturating_add(self.event_count);
        for (key, value) in &self.metadata {
            stored.metadata.insert(key.clone(), value.clone());
        }
    }
}

/// Everything one event's processing wants to write
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub event_id: i64,
    /// Agent upserts keyed by agent id, merged into the stored row
    pub agents: BTreeMap<String, Agent>,
    /// Session upserts keyed by session id
    pub sessions: BTreeMap<String, SessionChange>,
    pub model_details: Option<ModelDetails>,
    pub token_usage: Option<TokenUsage>,
    pub framework_details: Option<FrameworkDetails>,
    pub security_alerts: Vec<SecurityAlert>,
    pub performance_metrics: Vec<PerformanceMetric>,
    pub content_analyses: Vec<ContentAnalysis>,
    pub caller: Option<CallerSite>,
    pub mark_processed: bool,
}

impl ChangeSet {
    pub fn new(event_id: i64) -> Self {
        Self {
            event_id,
            ..Default::default()
        }
    }

    /// Whether a record of `kind` is staged in this change set
    pub fn stages(&self, kind: RecordKind) -> bool {
        match kind {
            RecordKind::ModelDetails => self.model_details.is_some(),
            RecordKind::TokenUsage => self.token_usage.is_some(),
            RecordKind::FrameworkDetails => self.framework_details.is_some(),
            RecordKind::SecurityAlert => !self.security_alerts.is_empty(),
            RecordKind::PerformanceMetric => !self.performance_metrics.is_empty(),
            RecordKind::ContentAnalysis => !self.content_analyses.is_empty(),
        }
    }

    /// Number of derived records staged (entities excluded)
    pub fn record_count(&self) -> usize {
        usize::from(self.model_details.is_some())
            + usize::from(self.token_usage.is_some())
            + usize::from(self.framework_details.is_some())
            + self.security_alerts.len()
            + self.performance_metrics.len()
            + self.content_analyses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
            && self.agents.is_empty()
            && self.sessions.is_empty()
            && self.caller.is_none()
            && !self.mark_processed
    }
}

/// Transactional boundary for one event
pub struct UnitOfWork {
    repo: Arc<dyn EventRepository>,
    changes: ChangeSet,
}

impl UnitOfWork {
    pub fn begin(repo: Arc<dyn EventRepository>, event_id: i64) -> Self {
        Self {
            repo,
            changes: ChangeSet::new(event_id),
        }
    }

    pub fn event_id(&self) -> i64 {
        self.changes.event_id
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    // ==================== Entities ====================

    pub async fn agent(&self, agent_id: &str) -> Result<Option<Agent>, DataError> {
        if let Some(agent) = self.changes.agents.get(agent_id) {
            return Ok(Some(agent.clone()));
        }
        self.repo.get_agent(agent_id).await
    }

    pub fn put_agent(&mut self, agent: Agent) {
        self.changes.agents.insert(agent.agent_id.clone(), agent);
    }

    pub async fn session(&self, session_id: &str) -> Result<Option<Session>, DataError> {
        if let Some(change) = self.changes.sessions.get(session_id) {
            return Ok(Some(change.session.clone()));
        }
        self.repo.get_session(session_id).await
    }

    /// Stage the session's state. Counts and metadata staged earlier are kept.
    pub fn put_session(&mut self, session: Session) {
        match self.changes.sessions.get_mut(&session.session_id) {
            Some(change) => change.session = session,
            None => {
                self.changes
                    .sessions
                    .insert(session.session_id.clone(), SessionChange::new(session));
            }
        }
    }

    /// Count this event against a session staged with [`Self::put_session`]
    pub fn count_session_event(&mut self, session_id: &str) {
        if let Some(change) = self.changes.sessions.get_mut(session_id) {
            change.event_count += 1;
            change.session.total_events += 1;
        }
    }

    /// Write metadata keys on a session staged with [`Self::put_session`]
    pub fn set_session_metadata(&mut self, session_id: &str, metadata: Map<String, JsonValue>) {
        if let Some(change) = self.changes.sessions.get_mut(session_id) {
            for (key, value) in metadata {
                change.session.metadata.insert(key.clone(), value.clone());
                change.metadata.insert(key, value);
            }
        }
    }

    pub async fn latest_open_session_for_agent(
        &self,
        agent_id: &str,
    ) -> Result<Option<Session>, DataError> {
        let sessions = self.sessions_for_agent(agent_id).await?;
        Ok(latest_session(sessions.into_iter().filter(Session::is_open)))
    }

    pub async fn latest_session_for_agent(
        &self,
        agent_id: &str,
    ) -> Result<Option<Session>, DataError> {
        let sessions = self.sessions_for_agent(agent_id).await?;
        Ok(latest_session(sessions.into_iter()))
    }

    /// Committed sessions overlaid with staged ones
    async fn sessions_for_agent(&self, agent_id: &str) -> Result<Vec<Session>, DataError> {
        let mut merged: BTreeMap<String, Session> = self
            .repo
            .list_sessions_for_agent(agent_id)
            .await?
            .into_iter()
            .map(|s| (s.session_id.clone(), s))
            .collect();
        for session in self.changes.sessions.values().map(|c| &c.session) {
            if session.agent_id == agent_id {
                merged.insert(session.session_id.clone(), session.clone());
            } else {
                merged.remove(&session.session_id);
            }
        }
        Ok(merged.into_values().collect())
    }

    // ==================== Derived Records ====================

    /// Whether a record of `kind` is staged or already committed for this event
    pub async fn has_record(&self, kind: RecordKind) -> Result<bool, DataError> {
        if self.changes.stages(kind) {
            return Ok(true);
        }
        self.repo.has_record(self.changes.event_id, kind).await
    }

    /// Stage model details. Returns `false` if the event already has some.
    pub async fn add_model_details(&mut self, details: ModelDetails) -> Result<bool, DataError> {
        if !self.claim_singleton(RecordKind::ModelDetails).await? {
            return Ok(false);
        }
        self.changes.model_details = Some(ModelDetails {
            event_id: self.changes.event_id,
            ..details
        });
        Ok(true)
    }

    /// Stage token usage. Returns `false` if the event already has some.
    pub async fn add_token_usage(&mut self, usage: TokenUsage) -> Result<bool, DataError> {
        if !self.claim_singleton(RecordKind::TokenUsage).await? {
            return Ok(false);
        }
        self.changes.token_usage = Some(TokenUsage {
            event_id: self.changes.event_id,
            ..usage
        });
        Ok(true)
    }

    /// Stage framework details. Returns `false` if the event already has some.
    pub async fn add_framework_details(
        &mut self,
        details: FrameworkDetails,
    ) -> Result<bool, DataError> {
        if !self.claim_singleton(RecordKind::FrameworkDetails).await? {
            return Ok(false);
        }
        self.changes.framework_details = Some(FrameworkDetails {
            event_id: self.changes.event_id,
            ..details
        });
        Ok(true)
    }

    async fn claim_singleton(&self, kind: RecordKind) -> Result<bool, DataError> {
        if self.has_record(kind).await? {
            tracing::debug!(
                event_id = self.changes.event_id,
                kind = kind.as_str(),
                "Singleton record already present, skipping"
            );
            return Ok(false);
        }
        Ok(true)
    }

    pub fn add_security_alert(&mut self, alert: SecurityAlert) {
        self.changes.security_alerts.push(SecurityAlert {
            event_id: self.changes.event_id,
            ..alert
        });
    }

    pub fn add_performance_metric(&mut self, metric: PerformanceMetric) {
        self.changes.performance_metrics.push(PerformanceMetric {
            event_id: self.changes.event_id,
            ..metric
        });
    }

    pub fn add_content_analysis(&mut self, analysis: ContentAnalysis) {
        self.changes.content_analyses.push(ContentAnalysis {
            event_id: self.changes.event_id,
            ..analysis
        });
    }

    // ==================== Event Updates ====================

    /// Stage caller-site fields for the event row
    pub fn set_caller(&mut self, caller: CallerSite) {
        if !caller.is_empty() {
            self.changes.caller = Some(caller);
        }
    }

    /// Stage the processed flag for the event row
    pub fn mark_processed(&mut self) {
        self.changes.mark_processed = true;
    }

    // ==================== Completion ====================

    /// Apply every staged change atomically and hand back what was written
    pub async fn commit(self) -> Result<ChangeSet, DataError> {
        self.repo.commit(&self.changes).await?;
        tracing::trace!(
            event_id = self.changes.event_id,
            records = self.changes.record_count(),
            "Unit of work committed"
        );
        Ok(self.changes)
    }

    /// Discard every staged change
    pub fn rollback(self) {
        tracing::trace!(event_id = self.changes.event_id, "Unit of work rolled back");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::memory::MemoryRepository;
    use crate::data::types::{Event, Severity};
    use chrono::{Duration, Utc};
    use serde_json::json;

    async fn staged_repo() -> (Arc<dyn EventRepository>, i64) {
        let repo: Arc<dyn EventRepository> = Arc::new(MemoryRepository::new());
        let event = repo
            .stage_event(Event::new("agent-1", "LLM_call_finish", json!({})))
            .await
            .unwrap();
        (repo, event.id)
    }

    fn usage(input: i64, output: i64) -> TokenUsage {
        TokenUsage {
            input_tokens: input,
            output_tokens: output,
            total_tokens: input + output,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_singleton_refused_when_staged() {
        let (repo, event_id) = staged_repo().await;
        let mut uow = UnitOfWork::begin(repo, event_id);

        assert!(uow.add_token_usage(usage(1, 2)).await.unwrap());
        assert!(!uow.add_token_usage(usage(10, 20)).await.unwrap());

        let staged = uow.changes().token_usage.as_ref().unwrap();
        assert_eq!(staged.input_tokens, 1);
        assert_eq!(staged.event_id, event_id);
    }

    #[tokio::test]
    async fn test_singleton_refused_when_committed() {
        let (repo, event_id) = staged_repo().await;

        let mut first = UnitOfWork::begin(repo.clone(), event_id);
        assert!(first.add_token_usage(usage(1, 2)).await.unwrap());
        first.commit().await.unwrap();

        let mut second = UnitOfWork::begin(repo.clone(), event_id);
        assert!(!second.add_token_usage(usage(1, 2)).await.unwrap());
        second.commit().await.unwrap();

        let records = repo.records_for_event(event_id).await.unwrap();
        assert_eq!(records.token_usage.len(), 1);
    }

    #[tokio::test]
    async fn test_reads_see_staged_entities() {
        let (repo, event_id) = staged_repo().await;
        let mut uow = UnitOfWork::begin(repo, event_id);
        let now = Utc::now();

        assert!(uow.agent("agent-1").await.unwrap().is_none());
        uow.put_agent(Agent::first_sighting("agent-1", now));
        assert!(uow.agent("agent-1").await.unwrap().is_some());

        uow.put_session(Session::open("s-1", "agent-1", now));
        let session = uow.session("s-1").await.unwrap().unwrap();
        assert_eq!(session.agent_id, "agent-1");
    }

    #[tokio::test]
    async fn test_latest_open_session_overlays_staged_close() {
        let (repo, event_id) = staged_repo().await;
        let t0 = Utc::now();

        let mut setup = UnitOfWork::begin(repo.clone(), event_id);
        setup.put_session(Session::open("old", "agent-1", t0));
        setup.put_session(Session::open("new", "agent-1", t0 + Duration::seconds(10)));
        setup.commit().await.unwrap();

        let mut uow = UnitOfWork::begin(repo, event_id);
        let mut newest = uow.session("new").await.unwrap().unwrap();
        newest.close(t0 + Duration::seconds(20));
        uow.put_session(newest);

        let open = uow
            .latest_open_session_for_agent("agent-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(open.session_id, "old");

        let any = uow.latest_session_for_agent("agent-1").await.unwrap().unwrap();
        assert_eq!(any.session_id, "new");
    }

    #[tokio::test]
    async fn test_multi_valued_records_take_event_id() {
        let (repo, event_id) = staged_repo().await;
        let mut uow = UnitOfWork::begin(repo, event_id);

        uow.add_security_alert(SecurityAlert {
            event_id: 999,
            alert_type: "suspicious".to_string(),
            severity: Severity::Medium,
            description: "x".to_string(),
            field_path: None,
            timestamp: Utc::now(),
        });

        assert_eq!(uow.changes().security_alerts[0].event_id, event_id);
        assert!(uow.has_record(RecordKind::SecurityAlert).await.unwrap());
        assert_eq!(uow.changes().record_count(), 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_changes() {
        let (repo, event_id) = staged_repo().await;
        let mut uow = UnitOfWork::begin(repo.clone(), event_id);
        assert!(uow.add_token_usage(usage(5, 5)).await.unwrap());
        uow.mark_processed();
        uow.rollback();

        let event = repo.get_event(event_id).await.unwrap().unwrap();
        assert!(!event.processed);
        assert!(!repo.has_record(event_id, RecordKind::TokenUsage).await.unwrap());
    }

    #[tokio::test]
    async fn test_session_counts_and_metadata_are_staged_as_deltas() {
        let (repo, event_id) = staged_repo().await;
        let t0 = Utc::now();

        let mut setup = UnitOfWork::begin(repo.clone(), event_id);
        let mut stored = Session::open("s-1", "agent-1", t0);
        stored.metadata.insert("debug_level".into(), json!("INFO"));
        setup.put_session(stored);
        for _ in 0..4 {
            setup.count_session_event("s-1");
        }
        setup.commit().await.unwrap();

        let mut uow = UnitOfWork::begin(repo, event_id);
        let session = uow.session("s-1").await.unwrap().unwrap();
        uow.put_session(session);
        uow.count_session_event("s-1");
        let mut metadata = Map::new();
        metadata.insert("llm_provider".into(), json!("anthropic"));
        uow.set_session_metadata("s-1", metadata);
        uow.count_session_event("unstaged");

        let change = &uow.changes().sessions["s-1"];
        assert_eq!(change.event_count, 1);
        assert_eq!(change.session.total_events, 5);
        assert_eq!(change.metadata.len(), 1);
        assert_eq!(change.session.metadata["debug_level"], json!("INFO"));
        assert!(!uow.changes().sessions.contains_key("unstaged"));
    }

    #[test]
    fn test_session_change_merge_keeps_newer_state() {
        let t0 = Utc::now();
        let mut stored = Session::open("s-1", "agent-1", t0);
        stored.total_events = 10;
        stored.close(t0 + Duration::seconds(30));
        stored.metadata.insert("debug_level".into(), json!("DEBUG"));

        // A view read before the close, counting one more event
        let mut stale = Session::open("s-1", "agent-1", t0 + Duration::seconds(1));
        stale.total_events = 3;
        let mut change = SessionChange::new(stale);
        change.event_count = 1;
        change.metadata.insert("llm_provider".into(), json!("openai"));
        change.merge_into(&mut stored);

        assert_eq!(stored.total_events, 11);
        assert_eq!(stored.start_time, t0);
        assert_eq!(stored.end_time, Some(t0 + Duration::seconds(30)));
        assert_eq!(stored.metadata["debug_level"], json!("DEBUG"));
        assert_eq!(stored.metadata["llm_provider"], json!("openai"));
        assert_eq!(change.new_row().total_events, 1);
    }

    #[test]
    fn test_change_set_emptiness() {
        let mut changes = ChangeSet::new(1);
        assert!(changes.is_empty());
        changes.mark_processed = true;
        assert!(!changes.is_empty());
        assert_eq!(changes.record_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_caller_not_staged() {
        let (repo, event_id) = staged_repo().await;
        let mut uow = UnitOfWork::begin(repo, event_id);
        uow.set_caller(CallerSite::default());
        assert!(uow.changes().caller.is_none());
    }
}
