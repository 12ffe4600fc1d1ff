//! Derived classroom statistics.
//!
//! Everything here is a pure function over an already-loaded
//! [`Snapshot`](crate::snapshot::Snapshot). Results are rebuilt on every
//! request and never stored.

pub mod badges;
pub mod behavior;
pub mod completion;
pub mod dashboard;
pub mod honor;
pub mod period;
pub mod ranking;

use chrono::NaiveDate;

/// Half-up percentage, `0` when the denominator is empty.
pub fn round_percent(numerator: f64, denominator: f64) -> u32 {
    if denominator <= 0.0 {
        return 0;
    }
    (100.0 * numerator / denominator + 0.5).floor() as u32
}

/// Reads the calendar date of an ISO date or datetime field.
///
/// Accepts `YYYY-MM-DD` optionally followed by a time part. Anything else is
/// a malformed record and yields `None`; callers exclude such records.
pub fn record_date(raw: &str) -> Option<NaiveDate> {
    let head = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}
