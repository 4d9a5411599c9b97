//! Atomic application of one event's change set

use sqlx::SqlitePool;

use super::entities::{upsert_agent, upsert_session};
use super::records::{
    has_record, insert_content_analysis, insert_framework_details, insert_model_details,
    insert_performance_metric, insert_security_alert, insert_token_usage, singleton_conflict,
};
use crate::data::sqlite::SqliteError;
use crate::data::types::RecordKind;
use crate::data::uow::ChangeSet;

/// Apply `changes` in a single transaction. Nothing is written on error.
///
/// The transaction takes the write lock up front, so the singleton checks and
/// the entity merges below see every earlier commit.
pub async fn commit_changes(pool: &SqlitePool, changes: &ChangeSet) -> Result<(), SqliteError> {
    let event_id = changes.event_id;
    let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;

    for kind in [
        RecordKind::ModelDetails,
        RecordKind::TokenUsage,
        RecordKind::FrameworkDetails,
    ] {
        if changes.stages(kind) && has_record(&mut tx, event_id, kind).await? {
            return Err(SqliteError::Conflict(singleton_conflict(kind, event_id)));
        }
    }

    for agent in changes.agents.values() {
        upsert_agent(&mut tx, agent).await?;
    }
    for change in changes.sessions.values() {
        upsert_session(&mut tx, change).await?;
    }

    if let Some(details) = &changes.model_details {
        insert_model_details(&mut tx, details).await?;
    }
    if let Some(usage) = &changes.token_usage {
        insert_token_usage(&mut tx, usage).await?;
    }
    if let Some(details) = &changes.framework_details {
        insert_framework_details(&mut tx, details).await?;
    }
    for alert in &changes.security_alerts {
        insert_security_alert(&mut tx, alert).await?;
    }
    for metric in &changes.performance_metrics {
        insert_performance_metric(&mut tx, metric).await?;
    }
    for analysis in &changes.content_analyses {
        insert_content_analysis(&mut tx, analysis).await?;
    }

    if changes.caller.is_some() || changes.mark_processed {
        let caller = changes.caller.clone().unwrap_or_default();
        // COALESCE keeps existing caller fields the change set does not carry;
        // MAX keeps `processed` monotonic.
        let updated = sqlx::query(
            "UPDATE events SET caller_file = COALESCE(?, caller_file), \
             caller_line = COALESCE(?, caller_line), \
             caller_function = COALESCE(?, caller_function), \
             processed = MAX(processed, ?) WHERE id = ?",
        )
        .bind(&caller.file)
        .bind(caller.line)
        .bind(&caller.function)
        .bind(changes.mark_processed)
        .bind(event_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(SqliteError::NotFound(format!("event {}", event_id)));
        }
    }

    tx.commit().await?;
    Ok(())
}
