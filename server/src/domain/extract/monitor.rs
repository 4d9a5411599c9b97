//! Session lifecycle from `monitor_init` / `monitor_shutdown`
//!
//! Init opens (or refreshes) a session. Shutdown closes one, searching:
//! 1. the session named by the event, if it exists
//! 2. the agent's most recent open session
//! 3. the agent's most recent session of any state
//! 4. otherwise a closed stub with `start == end == event.timestamp`

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue, json};

use super::extractor::{ExtractError, Extractor};
use super::paths::get_path;
use crate::data::types::{Event, Session};
use crate::data::uow::UnitOfWork;
use crate::utils::time::compact_stamp;

pub const MONITOR_INIT: &str = "monitor_init";
pub const MONITOR_SHUTDOWN: &str = "monitor_shutdown";

const STUB_REASON: &str = "Missing session for shutdown event";

pub struct MonitorEventExtractor;

impl MonitorEventExtractor {
    pub const KINDS: &'static [&'static str] = &[MONITOR_INIT, MONITOR_SHUTDOWN];
}

#[async_trait]
impl Extractor for MonitorEventExtractor {
    fn name(&self) -> &'static str {
        "monitor_event"
    }

    fn can_process(&self, event: &Event) -> bool {
        Self::KINDS.contains(&event.event_type.as_str())
    }

    async fn process(&self, event: &Event, uow: &mut UnitOfWork) -> Result<(), ExtractError> {
        match event.event_type.as_str() {
            MONITOR_INIT => open_session(event, uow).await,
            MONITOR_SHUTDOWN => close_session(event, uow).await,
            _ => Ok(()),
        }
    }
}

/// Monitor configuration recorded on the session
fn init_metadata(data: &JsonValue) -> Map<String, JsonValue> {
    let field = |key: &str, default: JsonValue| {
        get_path(data, key)
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or(default)
    };
    let mut metadata = Map::new();
    metadata.insert("debug_level".into(), field("debug_level", json!("INFO")));
    metadata.insert(
        "api_endpoint".into(),
        field("api_endpoint", json!("Not configured")),
    );
    metadata.insert("log_file".into(), field("log_file", JsonValue::Null));
    metadata.insert("llm_provider".into(), field("llm_provider", json!("Unknown")));
    metadata.insert(
        "development_mode".into(),
        field("development_mode", json!(false)),
    );
    metadata
}

async fn open_session(event: &Event, uow: &mut UnitOfWork) -> Result<(), ExtractError> {
    let session_id = event
        .session()
        .map(str::to_string)
        .unwrap_or_else(|| format!("monitor-{}", event.timestamp.to_rfc3339()));
    let metadata = init_metadata(&event.data);

    let session = match uow.session(&session_id).await? {
        Some(existing) => {
            tracing::debug!(session_id = %session_id, "Session exists, refreshing monitor metadata");
            existing
        }
        None => Session::open(&session_id, &event.agent_id, event.timestamp),
    };

    uow.put_session(session);
    uow.set_session_metadata(&session_id, metadata);
    Ok(())
}

async fn close_session(event: &Event, uow: &mut UnitOfWork) -> Result<(), ExtractError> {
    let named = match event.session() {
        Some(id) => uow.session(id).await?,
        None => None,
    };

    let found = match named {
        Some(session) => Some(session),
        None => match uow.latest_open_session_for_agent(&event.agent_id).await? {
            Some(session) => Some(session),
            None => uow.latest_session_for_agent(&event.agent_id).await?,
        },
    };

    match found {
        Some(mut session) => {
            session.close(event.timestamp);
            uow.put_session(session);
        }
        None => {
            tracing::warn!(
                agent_id = %event.agent_id,
                event_id = event.id,
                "No session for shutdown event, creating closed stub"
            );
            stage_stub_session(event, uow);
        }
    }
    Ok(())
}

fn stage_stub_session(event: &Event, uow: &mut UnitOfWork) {
    let session_id = format!("{}-{}", event.agent_id, compact_stamp(&event.timestamp));
    let mut session = Session::open(&session_id, &event.agent_id, event.timestamp);
    session.close(event.timestamp);
    uow.put_session(session);

    let mut metadata = Map::new();
    metadata.insert("auto_created".into(), json!(true));
    metadata.insert("reason".into(), json!(STUB_REASON));
    metadata.insert("event_id".into(), json!(event.id));
    uow.set_session_metadata(&session_id, metadata);
}
