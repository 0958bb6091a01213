//! SLA duration calculation.
//!
//! Pure functions only; the lifecycle engine calls these at the moment a
//! ticket is resolved and persists the result. The value is never recomputed
//! afterwards (a reopen-then-resolve cycle overwrites it with the latest
//! resolution).

use chrono::{DateTime, Utc};

/// Elapsed duration between creation and resolution, in fractional hours
/// rounded to two decimal places.
///
/// Whole calendar time, not business hours. Seconds below a full minute are
/// truncated, so the value is always a multiple of 1/60 before rounding.
pub fn duration_hours(created_at: DateTime<Utc>, solved_at: DateTime<Utc>) -> f64 {
    let minutes = (solved_at - created_at).num_minutes();
    let hours = minutes as f64 / 60.0;
    (hours * 100.0).round() / 100.0
}

/// Like [`duration_hours`], but `None` while the ticket is unresolved.
pub fn duration_hours_opt(
    created_at: DateTime<Utc>,
    solved_at: Option<DateTime<Utc>>,
) -> Option<f64> {
    solved_at.map(|solved| duration_hours(created_at, solved))
}
