//! Metadata keys shared by the adapters.
//!
//! Timestamps are written in the round-trip format produced by
//! [`format_timestamp`] and read back with [`parse_timestamp`].

use chrono::{DateTime, SecondsFormat, Utc};

/// Time the payload was saved
pub const SAVE_TIME: &str = "SaveTime";

/// Time the payload was last read
pub const READ_TIME: &str = "ReadTime";

/// Size of the payload in bytes, derived on read and never persisted
pub const LENGTH: &str = "Length";

/// Number of failures registered for a message
pub const ERROR_COUNT: &str = "ErrorCount";

/// Set to `"true"` once no further delivery attempts should be made
pub const IS_FINAL: &str = "IsFinal";

/// Format a timestamp for storage in blob metadata
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, false)
}

/// Parse a timestamp previously written with [`format_timestamp`]. Any
/// RFC 3339 offset is accepted.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Case-insensitive `"true"` check used for flag metadata
pub fn is_flag_set(value: Option<&String>) -> bool {
    value.map_or(false, |v| v.eq_ignore_ascii_case("true"))
}
