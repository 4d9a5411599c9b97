//! Derived record repository for SQLite operations

use sqlx::{SqliteConnection, SqlitePool};

use super::{conflict_on_unique, from_micros, to_micros};
use crate::data::sqlite::SqliteError;
use crate::data::types::{
    ComponentType, ContentAnalysis, EventRecords, FrameworkDetails, ModelDetails,
    PerformanceMetric, RecordCounts, RecordKind, SecurityAlert, Severity, TokenUsage,
};

fn table_for(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::ModelDetails => "model_details",
        RecordKind::TokenUsage => "token_usage",
        RecordKind::FrameworkDetails => "framework_details",
        RecordKind::SecurityAlert => "security_alerts",
        RecordKind::PerformanceMetric => "performance_metrics",
        RecordKind::ContentAnalysis => "content_analyses",
    }
}

pub async fn has_record(
    conn: &mut SqliteConnection,
    event_id: i64,
    kind: RecordKind,
) -> Result<bool, SqliteError> {
    let exists: bool = sqlx::query_scalar(&format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE event_id = ?)",
        table_for(kind)
    ))
    .bind(event_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(exists)
}

// ==================== Inserts ====================

pub async fn insert_model_details(
    conn: &mut SqliteConnection,
    r: &ModelDetails,
) -> Result<(), SqliteError> {
    sqlx::query(
        "INSERT INTO model_details (event_id, model_name, model_provider, model_type, model_version, \
         temperature, max_tokens, top_p) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(r.event_id)
    .bind(&r.model_name)
    .bind(&r.model_provider)
    .bind(&r.model_type)
    .bind(&r.model_version)
    .bind(r.temperature)
    .bind(r.max_tokens)
    .bind(r.top_p)
    .execute(&mut *conn)
    .await
    .map_err(|e| conflict_on_unique(e, || singleton_conflict(RecordKind::ModelDetails, r.event_id)))?;
    Ok(())
}

pub async fn insert_token_usage(
    conn: &mut SqliteConnection,
    r: &TokenUsage,
) -> Result<(), SqliteError> {
    sqlx::query(
        "INSERT INTO token_usage (event_id, input_tokens, output_tokens, total_tokens, \
         cache_read_tokens, cache_creation_tokens, model) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(r.event_id)
    .bind(r.input_tokens)
    .bind(r.output_tokens)
    .bind(r.total_tokens)
    .bind(r.cache_read_tokens)
    .bind(r.cache_creation_tokens)
    .bind(&r.model)
    .execute(&mut *conn)
    .await
    .map_err(|e| conflict_on_unique(e, || singleton_conflict(RecordKind::TokenUsage, r.event_id)))?;
    Ok(())
}

pub async fn insert_framework_details(
    conn: &mut SqliteConnection,
    r: &FrameworkDetails,
) -> Result<(), SqliteError> {
    let components = r.components.as_ref().map(serde_json::to_string).transpose()?;
    sqlx::query(
        "INSERT INTO framework_details (event_id, name, version, component_name, component_type, components) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(r.event_id)
    .bind(&r.name)
    .bind(&r.version)
    .bind(&r.component_name)
    .bind(r.component_type.map(|t| t.as_str()))
    .bind(components)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        conflict_on_unique(e, || singleton_conflict(RecordKind::FrameworkDetails, r.event_id))
    })?;
    Ok(())
}

pub async fn insert_security_alert(
    conn: &mut SqliteConnection,
    r: &SecurityAlert,
) -> Result<(), SqliteError> {
    sqlx::query(
        "INSERT INTO security_alerts (event_id, alert_type, severity, description, field_path, timestamp) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(r.event_id)
    .bind(&r.alert_type)
    .bind(r.severity.as_str())
    .bind(&r.description)
    .bind(&r.field_path)
    .bind(to_micros(&r.timestamp))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn insert_performance_metric(
    conn: &mut SqliteConnection,
    r: &PerformanceMetric,
) -> Result<(), SqliteError> {
    sqlx::query("INSERT INTO performance_metrics (event_id, duration_ms, timestamp) VALUES (?, ?, ?)")
        .bind(r.event_id)
        .bind(r.duration_ms)
        .bind(to_micros(&r.timestamp))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn insert_content_analysis(
    conn: &mut SqliteConnection,
    r: &ContentAnalysis,
) -> Result<(), SqliteError> {
    sqlx::query(
        "INSERT INTO content_analyses (event_id, content_type, content_text, word_count, \
         sentiment_score, toxicity_score) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(r.event_id)
    .bind(&r.content_type)
    .bind(&r.content_text)
    .bind(r.word_count)
    .bind(r.sentiment_score)
    .bind(r.toxicity_score)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) fn singleton_conflict(kind: RecordKind, event_id: i64) -> String {
    format!("{} already exists for event {}", kind.as_str(), event_id)
}

// ==================== Reads ====================

pub async fn records_for_event(
    pool: &SqlitePool,
    event_id: i64,
) -> Result<EventRecords, SqliteError> {
    let model_details = sqlx::query_as::<
        _,
        (
            i64,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<f64>,
            Option<i64>,
            Option<f64>,
        ),
    >(
        "SELECT event_id, model_name, model_provider, model_type, model_version, temperature, \
         max_tokens, top_p FROM model_details WHERE event_id = ?",
    )
    .bind(event_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(
        |(
            event_id,
            model_name,
            model_provider,
            model_type,
            model_version,
            temperature,
            max_tokens,
            top_p,
        )| ModelDetails {
            event_id,
            model_name,
            model_provider,
            model_type,
            model_version,
            temperature,
            max_tokens,
            top_p,
        },
    )
    .collect();

    let token_usage = sqlx::query_as::<
        _,
        (i64, i64, i64, i64, Option<i64>, Option<i64>, Option<String>),
    >(
        "SELECT event_id, input_tokens, output_tokens, total_tokens, cache_read_tokens, \
         cache_creation_tokens, model FROM token_usage WHERE event_id = ?",
    )
    .bind(event_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(
        |(event_id, input, output, total, cache_read, cache_creation, model)| TokenUsage {
            event_id,
            input_tokens: input,
            output_tokens: output,
            total_tokens: total,
            cache_read_tokens: cache_read,
            cache_creation_tokens: cache_creation,
            model,
        },
    )
    .collect();

    let framework_rows = sqlx::query_as::<
        _,
        (i64, String, String, Option<String>, Option<String>, Option<String>),
    >(
        "SELECT event_id, name, version, component_name, component_type, components \
         FROM framework_details WHERE event_id = ?",
    )
    .bind(event_id)
    .fetch_all(pool)
    .await?;
    let mut framework_details = Vec::with_capacity(framework_rows.len());
    for (event_id, name, version, component_name, component_type, components) in framework_rows {
        framework_details.push(FrameworkDetails {
            event_id,
            name,
            version,
            component_name,
            component_type: component_type.as_deref().and_then(ComponentType::parse),
            components: components
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
        });
    }

    let security_alerts = sqlx::query_as::<_, (i64, String, String, String, Option<String>, i64)>(
        "SELECT event_id, alert_type, severity, description, field_path, timestamp \
         FROM security_alerts WHERE event_id = ? ORDER BY id",
    )
    .bind(event_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(
        |(event_id, alert_type, severity, description, field_path, timestamp)| SecurityAlert {
            event_id,
            alert_type,
            severity: Severity::parse(&severity),
            description,
            field_path,
            timestamp: from_micros(timestamp),
        },
    )
    .collect();

    let performance_metrics = sqlx::query_as::<_, (i64, f64, i64)>(
        "SELECT event_id, duration_ms, timestamp FROM performance_metrics WHERE event_id = ? ORDER BY id",
    )
    .bind(event_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(event_id, duration_ms, timestamp)| PerformanceMetric {
        event_id,
        duration_ms,
        timestamp: from_micros(timestamp),
    })
    .collect();

    let content_analyses =
        sqlx::query_as::<_, (i64, String, String, i64, Option<f64>, Option<f64>)>(
            "SELECT event_id, content_type, content_text, word_count, sentiment_score, toxicity_score \
             FROM content_analyses WHERE event_id = ? ORDER BY id",
        )
        .bind(event_id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(
            |(event_id, content_type, content_text, word_count, sentiment_score, toxicity_score)| {
                ContentAnalysis {
                    event_id,
                    content_type,
                    content_text,
                    word_count,
                    sentiment_score,
                    toxicity_score,
                }
            },
        )
        .collect();

    Ok(EventRecords {
        model_details,
        token_usage,
        framework_details,
        security_alerts,
        performance_metrics,
        content_analyses,
    })
}

pub async fn record_counts(pool: &SqlitePool) -> Result<RecordCounts, SqliteError> {
    let row = sqlx::query_as::<_, (i64, i64, i64, i64, i64, i64, i64, i64, i64, i64)>(
        "SELECT \
         (SELECT COUNT(*) FROM events), \
         (SELECT COUNT(*) FROM events WHERE processed = 0), \
         (SELECT COUNT(*) FROM agents), \
         (SELECT COUNT(*) FROM sessions), \
         (SELECT COUNT(*) FROM model_details), \
         (SELECT COUNT(*) FROM token_usage), \
         (SELECT COUNT(*) FROM framework_details), \
         (SELECT COUNT(*) FROM security_alerts), \
         (SELECT COUNT(*) FROM performance_metrics), \
         (SELECT COUNT(*) FROM content_analyses)",
    )
    .fetch_one(pool)
    .await?;

    let n = |v: i64| u64::try_from(v).unwrap_or(0);
    Ok(RecordCounts {
        events: n(row.0),
        unprocessed_events: n(row.1),
        agents: n(row.2),
        sessions: n(row.3),
        model_details: n(row.4),
        token_usage: n(row.5),
        framework_details: n(row.6),
        security_alerts: n(row.7),
        performance_metrics: n(row.8),
        content_analyses: n(row.9),
    })
}
