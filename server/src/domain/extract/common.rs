//! Agent, session and caller bookkeeping shared by every event

use async_trait::async_trait;

use super::extractor::{ExtractError, Extractor, Phase};
use super::monitor::MONITOR_INIT;
use super::paths::{convert_opt, get_path, string_at};
use crate::data::types::{Agent, CallerSite, Event, Session};
use crate::data::uow::UnitOfWork;

/// Upserts the owning agent and session, and lifts `data.caller` onto the
/// event row. Universal: later extractors may assume both entities exist.
pub struct CommonExtractor;

#[async_trait]
impl Extractor for CommonExtractor {
    fn name(&self) -> &'static str {
        "common"
    }

    fn phase(&self) -> Phase {
        Phase::Universal
    }

    fn can_process(&self, _event: &Event) -> bool {
        true
    }

    async fn process(&self, event: &Event, uow: &mut UnitOfWork) -> Result<(), ExtractError> {
        if event.agent_id.is_empty() {
            return Err(ExtractError::MissingField("agent_id"));
        }

        upsert_agent(event, uow).await?;

        if let Some(session_id) = event.session() {
            upsert_session(event, session_id, uow).await?;
        }

        if let Some(caller) = caller_site(event) {
            uow.set_caller(caller);
        }

        Ok(())
    }
}

async fn upsert_agent(event: &Event, uow: &mut UnitOfWork) -> Result<(), ExtractError> {
    let mut agent = match uow.agent(&event.agent_id).await? {
        Some(mut agent) => {
            agent.touch(event.timestamp);
            agent
        }
        None => {
            tracing::debug!(agent_id = %event.agent_id, "First sighting of agent");
            Agent::first_sighting(&event.agent_id, event.timestamp)
        }
    };

    if agent.llm_provider.is_none() && event.event_type == MONITOR_INIT {
        agent.llm_provider = string_at(&event.data, "llm_provider");
    }

    uow.put_agent(agent);
    Ok(())
}

async fn upsert_session(
    event: &Event,
    session_id: &str,
    uow: &mut UnitOfWork,
) -> Result<(), ExtractError> {
    let session = uow
        .session(session_id)
        .await?
        .unwrap_or_else(|| Session::open(session_id, &event.agent_id, event.timestamp));
    uow.put_session(session);
    uow.count_session_event(session_id);
    Ok(())
}

fn caller_site(event: &Event) -> Option<CallerSite> {
    let caller = get_path(&event.data, "caller")?;
    if !caller.is_object() {
        return None;
    }
    let site = CallerSite {
        file: string_at(caller, "file"),
        line: convert_opt(caller.get("line")),
        function: string_at(caller, "function"),
    };
    (!site.is_empty()).then_some(site)
}
