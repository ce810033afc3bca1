//! Epoch-time helpers
//!
//! Loader tooling exchanges timestamps as fractional epoch seconds with
//! millisecond precision and prints them as `YYYY-MM-DD-HH:MM:SS`.

use chrono::{DateTime, TimeZone, Utc};

const READABLE_FORMAT: &str = "%Y-%m-%d-%H:%M:%S";

/// Current time truncated to millisecond precision
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    from_epoch_millis(now.timestamp_millis()).unwrap_or(now)
}

/// Fractional epoch seconds with millisecond precision
pub fn to_epoch_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp_millis() as f64 / 1000.0
}

/// Inverse of [`to_epoch_seconds`]; `None` for non-finite or out-of-range input
pub fn from_epoch_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    from_epoch_millis((seconds * 1000.0).round() as i64)
}

fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Render a timestamp for operator-facing output
pub fn readable(time: DateTime<Utc>) -> String {
    time.format(READABLE_FORMAT).to_string()
}
