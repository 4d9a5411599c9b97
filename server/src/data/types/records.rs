//! Records derived from events, plus the agent and session entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::enums::{ComponentType, Severity};

// ============================================================================
// Singleton records (at most one per event)
// ============================================================================

/// Model identity and request parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDetails {
    pub event_id: i64,
    pub model_name: Option<String>,
    pub model_provider: Option<String>,
    pub model_type: Option<String>,
    pub model_version: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i64>,
    pub top_p: Option<f64>,
}

impl ModelDetails {
    pub fn new(event_id: i64) -> Self {
        Self {
            event_id,
            ..Default::default()
        }
    }

    /// True when no field beyond the event id carries information
    pub fn is_empty(&self) -> bool {
        self.model_name.is_none()
            && self.model_provider.is_none()
            && self.model_type.is_none()
            && self.model_version.is_none()
            && self.temperature.is_none()
            && self.max_tokens.is_none()
            && self.top_p.is_none()
    }
}

/// Token counts for one model call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub event_id: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub cache_read_tokens: Option<i64>,
    pub cache_creation_tokens: Option<i64>,
    pub model: Option<String>,
}

/// Framework identity for the instrumented call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkDetails {
    pub event_id: i64,
    pub name: String,
    pub version: String,
    pub component_name: Option<String>,
    pub component_type: Option<ComponentType>,
    /// Raw `components` map when the payload carried one
    pub components: Option<Map<String, JsonValue>>,
}

// ============================================================================
// Multi-valued records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub event_id: i64,
    pub alert_type: String,
    pub severity: Severity,
    pub description: String,
    /// Dotted path of the flagged field, empty for event-level alerts
    pub field_path: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub event_id: i64,
    pub duration_ms: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentAnalysis {
    pub event_id: i64,
    pub content_type: String,
    pub content_text: String,
    pub word_count: i64,
    pub sentiment_score: Option<f64>,
    pub toxicity_score: Option<f64>,
}

// ============================================================================
// Entities
// ============================================================================

/// A monitored agent instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub llm_provider: Option<String>,
}

impl Agent {
    pub fn first_sighting(agent_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            agent_id: agent_id.into(),
            first_seen: at,
            last_seen: at,
            llm_provider: None,
        }
    }

    /// `last_seen` never moves backwards
    pub fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.last_seen {
            self.last_seen = at;
        }
    }

    /// Fold another view of the same agent into this one: the sighting window
    /// only widens and a known provider is never replaced.
    pub fn merge(&mut self, other: &Agent) {
        self.first_seen = self.first_seen.min(other.first_seen);
        self.touch(other.last_seen);
        if self.llm_provider.is_none() {
            self.llm_provider.clone_from(&other.llm_provider);
        }
    }
}

/// A bounded run of events sharing a session id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub agent_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_events: i64,
    pub metadata: Map<String, JsonValue>,
}

impl Session {
    pub fn open(
        session_id: impl Into<String>,
        agent_id: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            agent_id: agent_id.into(),
            start_time,
            end_time: None,
            total_events: 0,
            metadata: Map::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn close(&mut self, at: DateTime<Utc>) {
        self.end_time = Some(at);
    }
}

// ============================================================================
// Query results
// ============================================================================

/// All records derived from one event
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventRecords {
    pub model_details: Vec<ModelDetails>,
    pub token_usage: Vec<TokenUsage>,
    pub framework_details: Vec<FrameworkDetails>,
    pub security_alerts: Vec<SecurityAlert>,
    pub performance_metrics: Vec<PerformanceMetric>,
    pub content_analyses: Vec<ContentAnalysis>,
}

/// Row counts per table, for the `stats` command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordCounts {
    pub events: u64,
    pub unprocessed_events: u64,
    pub agents: u64,
    pub sessions: u64,
    pub model_details: u64,
    pub token_usage: u64,
    pub framework_details: u64,
    pub security_alerts: u64,
    pub performance_metrics: u64,
    pub content_analyses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_agent_touch_is_monotonic() {
        let t0 = Utc::now();
        let mut agent = Agent::first_sighting("a", t0);
        agent.touch(t0 + Duration::seconds(5));
        agent.touch(t0 - Duration::seconds(5));

        assert_eq!(agent.first_seen, t0);
        assert_eq!(agent.last_seen, t0 + Duration::seconds(5));
    }

    #[test]
    fn test_agent_merge_widens_window() {
        let t0 = Utc::now();
        let mut stored = Agent::first_sighting("a", t0);
        stored.touch(t0 + Duration::seconds(10));
        stored.llm_provider = Some("anthropic".to_string());

        let mut stale = Agent::first_sighting("a", t0 - Duration::seconds(3));
        stale.llm_provider = Some("openai".to_string());
        stored.merge(&stale);

        assert_eq!(stored.first_seen, t0 - Duration::seconds(3));
        assert_eq!(stored.last_seen, t0 + Duration::seconds(10));
        assert_eq!(stored.llm_provider.as_deref(), Some("anthropic"));
    }

    #[test]
    fn test_session_open_close() {
        let t0 = Utc::now();
        let mut session = Session::open("s", "a", t0);
        assert!(session.is_open());
        session.close(t0);
        assert!(!session.is_open());
        assert_eq!(session.end_time, Some(t0));
    }

    #[test]
    fn test_model_details_is_empty() {
        let mut details = ModelDetails::new(7);
        assert!(details.is_empty());
        details.top_p = Some(0.9);
        assert!(!details.is_empty());
    }
}
