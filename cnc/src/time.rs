//! Detector clock arithmetic.
//!
//! Event times reported by the builders are counted in DOM ticks of 0.1 ns
//! since the start of the current UTC year.

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta, Utc};

/// DOM clock ticks per second.
pub const TICKS_PER_SECOND: i64 = 10_000_000_000;

/// Converts a tick interval to seconds.
pub fn ticks_to_seconds(ticks: i64) -> f64 {
    ticks as f64 / TICKS_PER_SECOND as f64
}

/// Seconds elapsed between two DOM times, or `None` if the interval is empty
/// or negative.
pub fn elapsed_seconds(first: i64, last: i64) -> Option<f64> {
    if last <= first {
        return None;
    }
    Some(ticks_to_seconds(last - first))
}

/// Converts a DOM time to a calendar time in `year` (leap seconds ignored).
pub fn ticks_to_datetime(ticks: i64, year: i32) -> Option<NaiveDateTime> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_opt(0, 0, 0)?;
    let nanos = ticks / 10;
    start.checked_add_signed(TimeDelta::nanoseconds(nanos))
}

/// Like [`ticks_to_datetime`] for the current UTC year.
pub fn ticks_to_datetime_this_year(ticks: i64) -> Option<NaiveDateTime> {
    ticks_to_datetime(ticks, Utc::now().year())
}
