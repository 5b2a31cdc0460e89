//! Timestamps and calendar dates as stored in records.
//!
//! `createdAt`/`updatedAt` are RFC 3339 strings in UTC with millisecond
//! precision (`2024-01-01T09:30:00.000Z`). `logDate` and `birthday` are plain
//! `YYYY-MM-DD` calendar dates; log dates are taken in Japan Standard Time so a
//! day's entry does not flip at UTC midnight.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, SecondsFormat, Utc};

const DATE_FORMAT: &str = "%Y-%m-%d";
const JST_OFFSET_SECS: i32 = 9 * 3600;

/// Current time as an RFC 3339 UTC timestamp.
pub fn now_timestamp() -> String {
    timestamp_of(Utc::now())
}

pub fn timestamp_of(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The calendar date (JST) of an instant, formatted `YYYY-MM-DD`.
pub fn log_date_of(at: DateTime<Utc>) -> String {
    let jst = FixedOffset::east_opt(JST_OFFSET_SECS).unwrap_or_else(|| Utc.fix());
    at.with_timezone(&jst).format(DATE_FORMAT).to_string()
}

/// Today's log date in JST.
pub fn today_log_date() -> String {
    log_date_of(Utc::now())
}

/// Parse a strict `YYYY-MM-DD` date. Signs, padding, and single-digit months or
/// days are rejected, so the stored string is always the canonical form.
pub fn parse_log_date(value: &str) -> Option<NaiveDate> {
    let date = NaiveDate::parse_from_str(value, DATE_FORMAT).ok()?;
    (date.format(DATE_FORMAT).to_string() == value).then_some(date)
}

pub fn is_timestamp(value: &str) -> bool {
    DateTime::parse_from_rfc3339(value).is_ok()
}
