//! Notebook timestamps.
//!
//! Stored times are integer seconds since [`EPOCH`]. The epoch is defined as
//! February 1st 1970 minus a 31 day offset, which keeps local-time arithmetic
//! from underflowing in any timezone while landing on the Unix epoch itself.

use chrono::{DateTime, Local, TimeZone, Utc};

/// Offset subtracted from February 1st 1970 (seconds).
pub const SEC_OFFSET: i64 = 3600 * 24 * 31;

/// February 1st 1970, 00:00 UTC, as Unix seconds.
const FEB_1_1970: i64 = 3600 * 24 * 31;

/// Reference point for all stored timestamps, in Unix seconds.
pub const EPOCH: i64 = FEB_1_1970 - SEC_OFFSET;

/// Current time in notebook seconds.
pub fn get_timestamp() -> i64 {
    Utc::now().timestamp() - EPOCH
}

/// Converts a notebook timestamp into a UTC datetime.
pub fn to_datetime(timestamp: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(timestamp + EPOCH, 0).single()
}

/// Converts a notebook timestamp into local time.
pub fn to_local(timestamp: i64) -> Option<DateTime<Local>> {
    to_datetime(timestamp).map(|dt| dt.with_timezone(&Local))
}

/// Formats a notebook timestamp with a strftime-style format in local time.
pub fn format_timestamp(timestamp: i64, format: &str) -> String {
    match to_local(timestamp) {
        Some(dt) => dt.format(format).to_string(),
        None => String::new(),
    }
}

/// Parses a local time string back into notebook seconds.
pub fn parse_timestamp(text: &str, format: &str) -> Option<i64> {
    let naive = chrono::NaiveDateTime::parse_from_str(text, format).ok()?;
    let local = Local.from_local_datetime(&naive).single()?;
    Some(local.timestamp() - EPOCH)
}
