//! Store timestamps are nanoseconds since 2001-01-01T00:00:00Z.

use chrono::{DateTime, Utc};

/// Seconds between the Unix epoch and the store epoch.
pub const APPLE_EPOCH_OFFSET: i64 = 978_307_200;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Converts a raw store timestamp to UTC. A missing value maps to the store
/// epoch itself.
pub fn from_apple(raw: Option<i64>) -> DateTime<Utc> {
    let raw = raw.unwrap_or(0);
    let secs = raw.div_euclid(NANOS_PER_SECOND) + APPLE_EPOCH_OFFSET;
    let nanos = raw.rem_euclid(NANOS_PER_SECOND) as u32;
    DateTime::from_timestamp(secs, nanos).unwrap_or_default()
}

/// Converts a UTC time back to the store representation, for query bounds.
pub fn to_apple(date: DateTime<Utc>) -> i64 {
    (date.timestamp() - APPLE_EPOCH_OFFSET)
        .saturating_mul(NANOS_PER_SECOND)
        .saturating_add(i64::from(date.timestamp_subsec_nanos()))
}
