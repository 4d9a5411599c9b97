//! In-memory event repository
//!
//! Default backend for local runs and the backend every pipeline test uses.
//!
//! ## Limitations
//!
//! - Process exit = all events and derived records lost
//! - Single process only; the lock is not shared across instances

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::data::error::DataError;
use crate::data::traits::EventRepository;
use crate::data::types::{
    Agent, ContentAnalysis, Event, EventRecords, FrameworkDetails, ModelDetails,
    PerformanceMetric, RecordCounts, RecordKind, SecurityAlert, Session, TokenUsage,
};
use crate::data::uow::ChangeSet;

#[derive(Default)]
struct MemoryState {
    events: BTreeMap<i64, Event>,
    agents: HashMap<String, Agent>,
    sessions: HashMap<String, Session>,
    model_details: HashMap<i64, ModelDetails>,
    token_usage: HashMap<i64, TokenUsage>,
    framework_details: HashMap<i64, FrameworkDetails>,
    security_alerts: Vec<SecurityAlert>,
    performance_metrics: Vec<PerformanceMetric>,
    content_analyses: Vec<ContentAnalysis>,
}

impl MemoryState {
    fn next_event_id(&self) -> i64 {
        self.events.keys().next_back().copied().unwrap_or(0) + 1
    }

    fn has_record(&self, event_id: i64, kind: RecordKind) -> bool {
        match kind {
            RecordKind::ModelDetails => self.model_details.contains_key(&event_id),
            RecordKind::TokenUsage => self.token_usage.contains_key(&event_id),
            RecordKind::FrameworkDetails => self.framework_details.contains_key(&event_id),
            RecordKind::SecurityAlert => {
                self.security_alerts.iter().any(|r| r.event_id == event_id)
            }
            RecordKind::PerformanceMetric => self
                .performance_metrics
                .iter()
                .any(|r| r.event_id == event_id),
            RecordKind::ContentAnalysis => {
                self.content_analyses.iter().any(|r| r.event_id == event_id)
            }
        }
    }

    /// Every check that can fail runs before anything is written
    fn validate(&self, changes: &ChangeSet) -> Result<(), DataError> {
        let event_id = changes.event_id;
        if (changes.mark_processed || changes.caller.is_some())
            && !self.events.contains_key(&event_id)
        {
            return Err(DataError::NotFound(format!("event {}", event_id)));
        }
        for kind in [
            RecordKind::ModelDetails,
            RecordKind::TokenUsage,
            RecordKind::FrameworkDetails,
        ] {
            if changes.stages(kind) && self.has_record(event_id, kind) {
                return Err(DataError::Conflict(format!(
                    "{} already exists for event {}",
                    kind.as_str(),
                    event_id
                )));
            }
        }
        Ok(())
    }

    fn apply(&mut self, changes: &ChangeSet) {
        for agent in changes.agents.values() {
            match self.agents.get_mut(&agent.agent_id) {
                Some(stored) => stored.merge(agent),
                None => {
                    self.agents.insert(agent.agent_id.clone(), agent.clone());
                }
            }
        }
        for change in changes.sessions.values() {
            match self.sessions.get_mut(&change.session.session_id) {
                Some(stored) => change.merge_into(stored),
                None => {
                    self.sessions
                        .insert(change.session.session_id.clone(), change.new_row());
                }
            }
        }
        if let Some(details) = &changes.model_details {
            self.model_details.insert(details.event_id, details.clone());
        }
        if let Some(usage) = &changes.token_usage {
            self.token_usage.insert(usage.event_id, usage.clone());
        }
        if let Some(details) = &changes.framework_details {
            self.framework_details
                .insert(details.event_id, details.clone());
        }
        self.security_alerts
            .extend(changes.security_alerts.iter().cloned());
        self.performance_metrics
            .extend(changes.performance_metrics.iter().cloned());
        self.content_analyses
            .extend(changes.content_analyses.iter().cloned());

        if let Some(event) = self.events.get_mut(&changes.event_id) {
            if let Some(caller) = &changes.caller {
                event.apply_caller(caller);
            }
            if changes.mark_processed {
                event.mark_processed();
            }
        }
    }
}

/// Event repository backed by process memory
#[derive(Default)]
pub struct MemoryRepository {
    state: RwLock<MemoryState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventRepository for MemoryRepository {
    async fn stage_event(&self, mut event: Event) -> Result<Event, DataError> {
        let mut state = self.state.write();
        if event.id == 0 {
            event.id = state.next_event_id();
        } else if state.events.contains_key(&event.id) {
            return Err(DataError::Conflict(format!(
                "event {} already staged",
                event.id
            )));
        }
        state.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn get_event(&self, event_id: i64) -> Result<Option<Event>, DataError> {
        Ok(self.state.read().events.get(&event_id).cloned())
    }

    async fn list_unprocessed(&self, limit: usize) -> Result<Vec<Event>, DataError> {
        let state = self.state.read();
        Ok(state
            .events
            .values()
            .filter(|e| !e.processed)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, DataError> {
        Ok(self.state.read().agents.get(agent_id).cloned())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, DataError> {
        Ok(self.state.read().sessions.get(session_id).cloned())
    }

    async fn list_sessions_for_agent(&self, agent_id: &str) -> Result<Vec<Session>, DataError> {
        let state = self.state.read();
        Ok(state
            .sessions
            .values()
            .filter(|s| s.agent_id == agent_id)
            .cloned()
            .collect())
    }

    async fn has_record(&self, event_id: i64, kind: RecordKind) -> Result<bool, DataError> {
        Ok(self.state.read().has_record(event_id, kind))
    }

    async fn records_for_event(&self, event_id: i64) -> Result<EventRecords, DataError> {
        let state = self.state.read();
        Ok(EventRecords {
            model_details: state.model_details.get(&event_id).cloned().into_iter().collect(),
            token_usage: state.token_usage.get(&event_id).cloned().into_iter().collect(),
            framework_details: state
                .framework_details
                .get(&event_id)
                .cloned()
                .into_iter()
                .collect(),
            security_alerts: state
                .security_alerts
                .iter()
                .filter(|r| r.event_id == event_id)
                .cloned()
                .collect(),
            performance_metrics: state
                .performance_metrics
                .iter()
                .filter(|r| r.event_id == event_id)
                .cloned()
                .collect(),
            content_analyses: state
                .content_analyses
                .iter()
                .filter(|r| r.event_id == event_id)
                .cloned()
                .collect(),
        })
    }

    async fn record_counts(&self) -> Result<RecordCounts, DataError> {
        let state = self.state.read();
        Ok(RecordCounts {
            events: state.events.len() as u64,
            unprocessed_events: state.events.values().filter(|e| !e.processed).count() as u64,
            agents: state.agents.len() as u64,
            sessions: state.sessions.len() as u64,
            model_details: state.model_details.len() as u64,
            token_usage: state.token_usage.len() as u64,
            framework_details: state.framework_details.len() as u64,
            security_alerts: state.security_alerts.len() as u64,
            performance_metrics: state.performance_metrics.len() as u64,
            content_analyses: state.content_analyses.len() as u64,
        })
    }

    async fn commit(&self, changes: &ChangeSet) -> Result<(), DataError> {
        let mut state = self.state.write();
        state.validate(changes)?;
        state.apply(changes);
        Ok(())
    }
}
