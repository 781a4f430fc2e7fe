//! Field resolution policy
//!
//! A field is resolved from up to three candidates in fixed priority:
//! the value reported by the ranking service, the value already stored,
//! then the processing time. A stored date is therefore never replaced by
//! "now" on a later cycle, and re-running a cycle with the same input
//! resolves to the same values.

use chrono::{DateTime, Utc};

/// Pick `source`, else `stored`, else `now`
pub fn resolve<T>(source: Option<T>, stored: Option<T>, now: T) -> T {
    source.or(stored).unwrap_or(now)
}

/// Resolve a timestamp, dropping sub-millisecond precision first so the
/// result compares equal to what storage gives back
pub fn resolve_timestamp(
    source: Option<DateTime<Utc>>,
    stored: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    ranksync_common::time::truncate_to_millis(resolve(source, stored, now))
}

/// Earliest of a set of optional timestamps
pub fn earliest<I>(values: I) -> Option<DateTime<Utc>>
where
    I: IntoIterator<Item = Option<DateTime<Utc>>>,
{
    values.into_iter().flatten().min()
}

/// Non-positive star ratings mean "not rated" and are stored as NULL
pub fn normalize_star_rating(stars: f64) -> Option<f64> {
    if stars > 0.0 && stars.is_finite() {
        Some(stars)
    } else {
        None
    }
}
