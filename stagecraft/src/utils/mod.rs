//! Utility functions for identifier generation and timestamp handling.

pub mod timestamps;

pub use timestamps::{format_iso8601, iso_timestamp, now_utc, parse_timestamp, Timestamp};

use uuid::Uuid;

/// Generates a new UUID v4.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Generates a new time-ordered UUID v7.
///
/// Used for artifact identifiers so that ids sort by creation time.
#[must_use]
pub fn generate_uuid_v7() -> Uuid {
    Uuid::now_v7()
}
