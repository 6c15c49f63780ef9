//! Time helpers: UTC day bucketing for velocity caps, decay-period math.
//!
//! Spec §9 open question: velocity counters key on the UTC calendar date
//! string of `now`, not a rolling 24h window, matching the source
//! (`trust_decay.py`) — this is what `epoch_day` below gives callers.

use chrono::{DateTime, NaiveDate, Utc};

/// The UTC calendar date of `when`, as a stable, sortable string key
/// (`YYYY-MM-DD`). Two timestamps on the same UTC date produce the same key
/// even if they are many hours apart in wall-clock time; a timestamp just
/// after UTC midnight is a different key than one just before, even if only
/// seconds apart. That boundary behavior is intentional (spec §9).
pub fn epoch_day(when: DateTime<Utc>) -> NaiveDate {
    when.date_naive()
}

/// Elapsed wall-clock seconds between two timestamps, never negative.
pub fn elapsed_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds().max(0) as f64 / 1000.0
}

/// Elapsed time expressed in decay periods (spec §4.4 default: 1 day).
pub fn elapsed_periods(from: DateTime<Utc>, to: DateTime<Utc>, period_secs: f64) -> f64 {
    (elapsed_secs(from, to) / period_secs).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn epoch_day_buckets_by_utc_calendar_date() {
        let a = Utc.with_ymd_and_hms(2026, 1, 1, 23, 59, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 1).unwrap();
        assert_ne!(epoch_day(a), epoch_day(b));
    }

    #[test]
    fn elapsed_periods_scales_by_period_length() {
        let a = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 1, 3, 0, 0, 0).unwrap();
        assert!((elapsed_periods(a, b, 86_400.0) - 2.0).abs() < 1e-9);
    }
}
