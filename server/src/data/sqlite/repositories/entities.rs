//! Agent and session repository for SQLite operations

use serde_json::{Map, Value as JsonValue};
use sqlx::{SqliteConnection, SqlitePool};

use super::{from_micros, to_micros};
use crate::data::sqlite::SqliteError;
use crate::data::types::{Agent, Session};
use crate::data::uow::SessionChange;

type SessionTuple = (String, String, i64, Option<i64>, i64, String);

fn session_from_tuple(
    (session_id, agent_id, start_time, end_time, total_events, metadata): SessionTuple,
) -> Result<Session, SqliteError> {
    Ok(Session {
        session_id,
        agent_id,
        start_time: from_micros(start_time),
        end_time: end_time.map(from_micros),
        total_events,
        metadata: serde_json::from_str(&metadata)?,
    })
}

pub async fn get_agent(pool: &SqlitePool, agent_id: &str) -> Result<Option<Agent>, SqliteError> {
    let row = sqlx::query_as::<_, (String, i64, i64, Option<String>)>(
        "SELECT agent_id, first_seen, last_seen, llm_provider FROM agents WHERE agent_id = ?",
    )
    .bind(agent_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(agent_id, first_seen, last_seen, llm_provider)| Agent {
        agent_id,
        first_seen: from_micros(first_seen),
        last_seen: from_micros(last_seen),
        llm_provider,
    }))
}

pub async fn get_session(
    pool: &SqlitePool,
    session_id: &str,
) -> Result<Option<Session>, SqliteError> {
    let row = sqlx::query_as::<_, SessionTuple>(
        "SELECT session_id, agent_id, start_time, end_time, total_events, metadata FROM sessions WHERE session_id = ?",
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?;
    row.map(session_from_tuple).transpose()
}

pub async fn list_sessions_for_agent(
    pool: &SqlitePool,
    agent_id: &str,
) -> Result<Vec<Session>, SqliteError> {
    let rows = sqlx::query_as::<_, SessionTuple>(
        "SELECT session_id, agent_id, start_time, end_time, total_events, metadata FROM sessions WHERE agent_id = ? ORDER BY start_time",
    )
    .bind(agent_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(session_from_tuple).collect()
}

/// Insert the agent, or widen the stored sighting window. A stored provider wins.
pub async fn upsert_agent(conn: &mut SqliteConnection, agent: &Agent) -> Result<(), SqliteError> {
    sqlx::query(
        "INSERT INTO agents (agent_id, first_seen, last_seen, llm_provider) VALUES (?, ?, ?, ?) \
         ON CONFLICT(agent_id) DO UPDATE SET \
         first_seen = MIN(agents.first_seen, excluded.first_seen), \
         last_seen = MAX(agents.last_seen, excluded.last_seen), \
         llm_provider = COALESCE(agents.llm_provider, excluded.llm_provider)",
    )
    .bind(&agent.agent_id)
    .bind(to_micros(&agent.first_seen))
    .bind(to_micros(&agent.last_seen))
    .bind(&agent.llm_provider)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Insert the session, or merge the change into the stored row.
///
/// Mirrors [`SessionChange::merge_into`]: the start only moves earlier, the
/// end only later (a close is never undone), event counts are added and only
/// the metadata keys the change writes are replaced.
pub async fn upsert_session(
    conn: &mut SqliteConnection,
    change: &SessionChange,
) -> Result<(), SqliteError> {
    let row = change.new_row();
    let metadata = serde_json::to_string(&row.metadata)?;
    sqlx::query(
        "INSERT INTO sessions (session_id, agent_id, start_time, end_time, total_events, metadata) \
         VALUES (?, ?, ?, ?, ?, ?) \
         ON CONFLICT(session_id) DO UPDATE SET \
         start_time = MIN(sessions.start_time, excluded.start_time), \
         end_time = MAX(COALESCE(sessions.end_time, excluded.end_time), \
                        COALESCE(excluded.end_time, sessions.end_time)), \
         total_events = sessions.total_events + excluded.total_events",
    )
    .bind(&row.session_id)
    .bind(&row.agent_id)
    .bind(to_micros(&row.start_time))
    .bind(row.end_time.as_ref().map(to_micros))
    .bind(row.total_events)
    .bind(&metadata)
    .execute(&mut *conn)
    .await?;

    if change.metadata.is_empty() {
        return Ok(());
    }

    // Runs inside the commit's write transaction
    let stored: String = sqlx::query_scalar("SELECT metadata FROM sessions WHERE session_id = ?")
        .bind(&row.session_id)
        .fetch_one(&mut *conn)
        .await?;
    let mut merged: Map<String, JsonValue> = serde_json::from_str(&stored)?;
    for (key, value) in &change.metadata {
        merged.insert(key.clone(), value.clone());
    }
    sqlx::query("UPDATE sessions SET metadata = ? WHERE session_id = ?")
        .bind(serde_json::to_string(&merged)?)
        .bind(&row.session_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
