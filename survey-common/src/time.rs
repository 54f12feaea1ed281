//! Timestamp utilities

use chrono::{DateTime, Utc};

/// `strftime` pattern for hour buckets: year, month, day, hour, no separators
pub const HOUR_BUCKET_FORMAT: &str = "%Y%m%d%H";

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Truncate a timestamp to its UTC hour bucket, e.g. `2024010110`
pub fn hour_bucket(at: DateTime<Utc>) -> String {
    at.format(HOUR_BUCKET_FORMAT).to_string()
}
