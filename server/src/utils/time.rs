//! Time utility functions

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Naive layouts accepted after RFC 3339 fails, interpreted as UTC.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
];

/// Convert seconds since Unix epoch (fractional) to DateTime<Utc>
pub fn secs_to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.trunc() as i64;
    let nanos = ((secs - secs.trunc()) * 1_000_000_000.0).round() as u32;
    Utc.timestamp_opt(whole, nanos.min(999_999_999)).single()
}

/// Parse ISO 8601 / RFC 3339 timestamp string to DateTime<Utc>.
///
/// A trailing `Z` is UTC. Strings without an offset are read as UTC.
pub fn parse_iso_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    if ts.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(ts, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(ts, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Compact stamp used in synthesized identifiers (`20250317140811`)
pub fn compact_stamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y%m%d%H%M%S").to_string()
}
