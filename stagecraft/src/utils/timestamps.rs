//! Timestamp helpers.
//!
//! Stage and artifact timestamps are UTC. The remote service reports
//! `createdAt` either as an ISO 8601 string or as Unix milliseconds, so
//! artifact deserialization goes through [`deserialize_flexible`].

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Errors that can occur during timestamp parsing.
#[derive(Debug, Error)]
pub enum TimestampError {
    /// The timestamp string is empty.
    #[error("Empty timestamp string")]
    EmptyString,

    /// The timestamp value is invalid.
    #[error("Invalid timestamp: {0}")]
    InvalidFormat(String),
}

/// Returns the current UTC time as an ISO 8601 formatted string.
///
/// Format: `YYYY-MM-DDTHH:MM:SS.ffffff+00:00`
///
/// # Examples
///
/// ```
/// use stagecraft::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.contains('T'));
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    format_iso8601(&Utc::now())
}

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Formats a timestamp as ISO 8601 string.
#[must_use]
pub fn format_iso8601(dt: &Timestamp) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Parses a timestamp from an ISO 8601 string or Unix milliseconds.
///
/// # Errors
///
/// Returns `TimestampError` if the input cannot be parsed.
pub fn parse_timestamp(input: &str) -> Result<Timestamp, TimestampError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(TimestampError::EmptyString);
    }

    if let Ok(millis) = trimmed.parse::<i64>() {
        return from_unix_millis(millis);
    }

    let normalized = trimmed.replace('Z', "+00:00");
    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    Err(TimestampError::InvalidFormat(trimmed.to_string()))
}

fn from_unix_millis(millis: i64) -> Result<Timestamp, TimestampError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| TimestampError::InvalidFormat(millis.to_string()))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Text(String),
}

/// Serde helper accepting either an ISO 8601 string or Unix milliseconds.
pub fn deserialize_flexible<'de, D>(deserializer: D) -> Result<Timestamp, D::Error>
where
    D: Deserializer<'de>,
{
    let parsed = match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Millis(millis) => from_unix_millis(millis),
        RawTimestamp::Text(text) => parse_timestamp(&text),
    };
    parsed.map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_parse_iso8601() {
        let dt = parse_timestamp("2023-10-05T14:30:00Z").unwrap();
        assert_eq!(dt.year(), 2023);
        assert_eq!(dt.month(), 10);
        assert_eq!(dt.day(), 5);
    }

    #[test]
    fn test_parse_unix_millis() {
        let dt = parse_timestamp("1696512000000").unwrap();
        assert_eq!(dt.year(), 2023);
    }

    #[test]
    fn test_parse_empty_string() {
        assert!(matches!(parse_timestamp("  "), Err(TimestampError::EmptyString)));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(TimestampError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_iso_timestamp_format() {
        let ts = iso_timestamp();
        assert!(ts.contains('T'));
        assert!(ts.ends_with("+00:00"));
    }

    #[test]
    fn test_deserialize_flexible_accepts_both_forms() {
        #[derive(Deserialize)]
        struct Holder {
            #[serde(deserialize_with = "deserialize_flexible")]
            at: Timestamp,
        }

        let from_text: Holder = serde_json::from_str(r#"{"at": "2024-01-02T03:04:05Z"}"#).unwrap();
        let from_millis: Holder = serde_json::from_str(r#"{"at": 1704164645000}"#).unwrap();
        assert_eq!(from_text.at, from_millis.at);
    }
}
