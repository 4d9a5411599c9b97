//! The ingested telemetry event

use chrono::{DateTime, Utc};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::utils::time::{parse_iso_timestamp, secs_to_datetime};

fn default_level() -> String {
    "INFO".to_string()
}

fn default_channel() -> String {
    "default".to_string()
}

/// Accepts RFC 3339 / naive ISO strings and epoch seconds.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = JsonValue::deserialize(deserializer)?;
    let parsed = match &raw {
        JsonValue::String(s) => parse_iso_timestamp(s),
        JsonValue::Number(n) => n.as_f64().and_then(secs_to_datetime),
        _ => None,
    };
    parsed.ok_or_else(|| D::Error::custom(format!("invalid timestamp: {}", raw)))
}

/// Call-site metadata copied from `data.caller`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerSite {
    pub file: Option<String>,
    pub line: Option<i64>,
    pub function: Option<String>,
}

impl CallerSite {
    pub fn is_empty(&self) -> bool {
        self.file.is_none() && self.line.is_none() && self.function.is_none()
    }
}

/// One telemetry event emitted by a monitored agent.
///
/// Only the extraction pipeline mutates an event after staging, and only to
/// fill the caller fields and to flip `processed` from false to true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Assigned by the store on staging when zero
    #[serde(default)]
    pub id: i64,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_level")]
    pub level: String,
    pub agent_id: String,
    #[serde(alias = "type")]
    pub event_type: String,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub relationship_id: Option<String>,
    #[serde(default)]
    pub data: JsonValue,
    #[serde(default)]
    pub duration_ms: Option<f64>,
    #[serde(default)]
    pub caller_file: Option<String>,
    #[serde(default)]
    pub caller_line: Option<i64>,
    #[serde(default)]
    pub caller_function: Option<String>,
    #[serde(default)]
    pub processed: bool,
}

impl Event {
    /// Create an unstaged event with default level and channel
    pub fn new(agent_id: impl Into<String>, event_type: impl Into<String>, data: JsonValue) -> Self {
        Self {
            id: 0,
            timestamp: Utc::now(),
            level: default_level(),
            agent_id: agent_id.into(),
            event_type: event_type.into(),
            channel: default_channel(),
            direction: None,
            session_id: None,
            relationship_id: None,
            data,
            duration_ms: None,
            caller_file: None,
            caller_line: None,
            caller_function: None,
            processed: false,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Session id if present and non-empty
    pub fn session(&self) -> Option<&str> {
        self.session_id.as_deref().filter(|s| !s.is_empty())
    }

    pub fn caller(&self) -> CallerSite {
        CallerSite {
            file: self.caller_file.clone(),
            line: self.caller_line,
            function: self.caller_function.clone(),
        }
    }

    /// Overwrite only the caller fields that are present in `caller`
    pub fn apply_caller(&mut self, caller: &CallerSite) {
        if let Some(file) = &caller.file {
            self.caller_file = Some(file.clone());
        }
        if let Some(line) = caller.line {
            self.caller_line = Some(line);
        }
        if let Some(function) = &caller.function {
            self.caller_function = Some(function.clone());
        }
    }

    /// Monotonic: there is no way to unset the flag
    pub fn mark_processed(&mut self) {
        self.processed = true;
    }
}
