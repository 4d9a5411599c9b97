//! Event repository for SQLite operations

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{conflict_on_unique, from_micros, to_micros};
use crate::data::sqlite::SqliteError;
use crate::data::types::Event;

const EVENT_COLUMNS: &str = "id, timestamp, level, agent_id, event_type, channel, direction, \
     session_id, relationship_id, data, duration_ms, caller_file, caller_line, caller_function, processed";

fn event_from_row(row: &SqliteRow) -> Result<Event, SqliteError> {
    let data: String = row.try_get("data")?;
    Ok(Event {
        id: row.try_get("id")?,
        timestamp: from_micros(row.try_get("timestamp")?),
        level: row.try_get("level")?,
        agent_id: row.try_get("agent_id")?,
        event_type: row.try_get("event_type")?,
        channel: row.try_get("channel")?,
        direction: row.try_get("direction")?,
        session_id: row.try_get("session_id")?,
        relationship_id: row.try_get("relationship_id")?,
        data: serde_json::from_str(&data)?,
        duration_ms: row.try_get("duration_ms")?,
        caller_file: row.try_get("caller_file")?,
        caller_line: row.try_get("caller_line")?,
        caller_function: row.try_get("caller_function")?,
        processed: row.try_get("processed")?,
    })
}

/// Insert an event. A zero id lets SQLite assign one.
pub async fn insert_event(pool: &SqlitePool, mut event: Event) -> Result<Event, SqliteError> {
    let data = serde_json::to_string(&event.data)?;
    let requested_id = (event.id != 0).then_some(event.id);

    let result = sqlx::query(
        "INSERT INTO events (id, timestamp, level, agent_id, event_type, channel, direction, \
         session_id, relationship_id, data, duration_ms, caller_file, caller_line, caller_function, processed) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(requested_id)
    .bind(to_micros(&event.timestamp))
    .bind(&event.level)
    .bind(&event.agent_id)
    .bind(&event.event_type)
    .bind(&event.channel)
    .bind(&event.direction)
    .bind(&event.session_id)
    .bind(&event.relationship_id)
    .bind(&data)
    .bind(event.duration_ms)
    .bind(&event.caller_file)
    .bind(event.caller_line)
    .bind(&event.caller_function)
    .bind(event.processed)
    .execute(pool)
    .await
    .map_err(|e| conflict_on_unique(e, || format!("event {} already staged", event.id)))?;

    event.id = result.last_insert_rowid();
    Ok(event)
}

pub async fn get_event(pool: &SqlitePool, id: i64) -> Result<Option<Event>, SqliteError> {
    let row = sqlx::query(&format!("SELECT {} FROM events WHERE id = ?", EVENT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(event_from_row).transpose()
}

/// Oldest-first unprocessed events
pub async fn list_unprocessed(pool: &SqlitePool, limit: usize) -> Result<Vec<Event>, SqliteError> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM events WHERE processed = 0 ORDER BY id LIMIT ?",
        EVENT_COLUMNS
    ))
    .bind(i64::try_from(limit).unwrap_or(i64::MAX))
    .fetch_all(pool)
    .await?;
    rows.iter().map(event_from_row).collect()
}
