//! Timestamp helpers for the server's JSON date format.
//!
//! The server renders timestamps as ISO-8601 with millisecond precision
//! and a zone designator, e.g. `2024-03-01T09:30:00.000Z` or
//! `2024-03-01T09:30:00.000+0100`.

use chrono::{DateTime, ParseError, SecondsFormat, Utc};

const OFFSET_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

/// Parse a server timestamp string into a UTC datetime.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, ParseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    DateTime::parse_from_str(s, OFFSET_FORMAT).map(|dt| dt.with_timezone(&Utc))
}

/// Format a datetime the way the server expects it in JSON bodies.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}
