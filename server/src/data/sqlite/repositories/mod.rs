//! SQLite query functions, grouped by table family

pub mod commit;
pub mod entities;
pub mod events;
pub mod records;

use chrono::{DateTime, Utc};

use super::SqliteError;

pub(crate) fn to_micros(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

/// Out-of-range values decode as the Unix epoch
pub(crate) fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_default()
}

/// Map UNIQUE / PRIMARY KEY violations to `Conflict`
pub(crate) fn conflict_on_unique(e: sqlx::Error, what: impl FnOnce() -> String) -> SqliteError {
    let is_unique = e
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation());
    if is_unique {
        SqliteError::Conflict(what())
    } else {
        SqliteError::Database(e)
    }
}

#[cfg(test)]
pub(crate) async fn setup_test_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect(":memory:").await.unwrap();
    sqlx::query(crate::data::sqlite::schema::SCHEMA)
        .execute(&pool)
        .await
        .unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_micros_roundtrip() {
        let now = Utc::now();
        let back = from_micros(to_micros(&now));
        assert_eq!(back.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn test_from_micros_out_of_range() {
        assert_eq!(from_micros(i64::MAX).timestamp(), 0);
    }
}
