//! Timestamp utilities
//!
//! Catalog timestamps are stored as fixed-width RFC 3339 text
//! (`YYYY-MM-DDTHH:MM:SS.mmmZ`). Every stored value has the same shape, so
//! SQL `MAX()` over the text column is also the chronological maximum.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp, truncated to the precision kept in storage
pub fn now() -> DateTime<Utc> {
    truncate_to_millis(Utc::now())
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

/// Drop sub-millisecond precision so a value survives a storage round trip unchanged
pub fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ts.timestamp_millis())
        .single()
        .unwrap_or(ts)
}

/// Format a timestamp the way it is stored in the catalog
pub fn to_db_string(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored catalog timestamp
pub fn parse_db_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::InvalidInput(format!("Bad stored timestamp '{}': {}", value, e)))
}

/// Parse an optional stored timestamp column
pub fn parse_optional_db_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_db_timestamp).transpose()
}

/// Unix seconds (as sent by some ranking services) to UTC
pub fn from_unix_seconds(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}
