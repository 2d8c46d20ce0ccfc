//! Calendar-day and ISO-week keys in a fixed reference time zone.
//!
//! Keys are derived from the zone-local calendar date, so they are stable
//! across intra-day changes and DST transitions. Week keys follow ISO 8601:
//! weeks start on Monday and week 1 is the week containing January 4th, so
//! the year in the key is the ISO week-year (`2024-12-30` is `2025-W01`).

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;

/// The pair of period keys for one instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimeKeys {
    /// `YYYY-MM-DD`.
    pub day: String,
    /// `{ISOYear}-W{ww}`.
    pub week: String,
}

impl TimeKeys {
    /// Compute both keys for `now` in `zone`.
    pub fn at(now: DateTime<Utc>, zone: Tz) -> Self {
        let date = local_date(now, zone);
        Self {
            day: day_key_for_date(date),
            week: week_key_for_date(date),
        }
    }
}

/// Calendar date of `now` in `zone`.
pub fn local_date(now: DateTime<Utc>, zone: Tz) -> NaiveDate {
    now.with_timezone(&zone).date_naive()
}

/// `YYYY-MM-DD` for `now` in `zone`.
pub fn day_key(now: DateTime<Utc>, zone: Tz) -> String {
    day_key_for_date(local_date(now, zone))
}

/// `{ISOYear}-W{ww}` for `now` in `zone`.
pub fn week_key(now: DateTime<Utc>, zone: Tz) -> String {
    week_key_for_date(local_date(now, zone))
}

fn day_key_for_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn week_key_for_date(date: NaiveDate) -> String {
    let iso = date.iso_week();
    format!("{}-W{:02}", iso.year(), iso.week())
}

/// Clamp a signed minute count to the non-negative `u32` range.
pub fn clamp_min0(minutes: i64) -> u32 {
    u32::try_from(minutes.max(0)).unwrap_or(u32::MAX)
}

/// Render minutes as `45m`, `2h`, or `2h 5m`.
pub fn format_minutes(total_min: u32) -> String {
    let hours = total_min / 60;
    let rest = total_min % 60;
    match (hours, rest) {
        (0, r) => format!("{r}m"),
        (h, 0) => format!("{h}h"),
        (h, r) => format!("{h}h {r}m"),
    }
}
