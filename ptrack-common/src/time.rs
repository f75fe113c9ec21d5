//! Timestamp utilities

use chrono::{DateTime, NaiveDateTime, Utc};
use std::time::Duration;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Parse a timestamp sent by the process-record service
///
/// The service emits RFC 3339 strings, but older endpoints send naive ISO
/// timestamps without an offset; those are taken as UTC.
pub fn parse_server_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Render a wait as "N min S s" (or "S s" under a minute)
pub fn format_wait(wait: Duration) -> String {
    let secs = wait.as_secs();
    let (mins, secs) = (secs / 60, secs % 60);
    if mins == 0 {
        format!("{} s", secs)
    } else {
        format!("{} min {} s", mins, secs)
    }
}
