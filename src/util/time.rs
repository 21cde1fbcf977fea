//! Wall-clock helpers.

use std::time::{SystemTime, UNIX_EPOCH};

use time::macros::format_description;
use time::OffsetDateTime;

/// Nanoseconds since the Unix epoch.
pub type Nanos = i64;

pub const NANOS_TO_MICROS: Nanos = 1_000;
pub const MICROS_TO_MILLIS: Nanos = 1_000;
pub const MILLIS_TO_SECS: Nanos = 1_000;
pub const NANOS_TO_MILLIS: Nanos = NANOS_TO_MICROS * MICROS_TO_MILLIS;
pub const NANOS_TO_SECS: Nanos = NANOS_TO_MILLIS * MILLIS_TO_SECS;

#[inline]
pub fn now_nanos() -> Nanos {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as Nanos)
        .unwrap_or(0)
}

/// Current UTC time as `YYYY-MM-DD HH:MM:SS.nnnnnnnnn`.
pub fn current_time_str() -> String {
    let format =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:9]");
    OffsetDateTime::now_utc()
        .format(&format)
        .unwrap_or_else(|_| now_nanos().to_string())
}
