//! Sliding-window arithmetic over fetch-relative timestamp offsets.
//!
//! All quantities here are seconds relative to the snapshot's fetch time:
//! request offsets are recorded as `fetched_at - now` (negative once the
//! event is in the past), and the window bound is derived the same way, so
//! offsets and bound stay on one consistent convention as the snapshot
//! ages.

use super::stats::StatsSnapshot;

/// Length of the sliding window in seconds.
const WINDOW_SECS: f64 = 60.0;

/// Upper bound for offsets that count as "within the last minute".
///
/// Computed as `(fetched_at - now) + 60`: the first term is the snapshot's
/// age with the fetch-relative sign, so the bound shrinks from 60 toward
/// zero (and past it) as the snapshot gets older.
pub fn check_window(fetched_at: f64, now: f64) -> f64 {
    (fetched_at - now) + WINDOW_SECS
}

/// Count the offsets that fall within the window bound.
pub fn requests_in_window(offsets: &[f64], window_end: f64) -> usize {
    offsets.iter().filter(|offset| **offset <= window_end).count()
}

/// Evaluate both quotas: the minute window must have headroom and the day
/// counter must be under its limit.
pub fn within_limits(stats: &StatsSnapshot, window_end: f64) -> bool {
    let minute_hits = requests_in_window(&stats.request_timestamp_offsets, window_end) as u64;
    minute_hits < stats.requests_per_minute_limit
        && stats.requests_last_day < stats.requests_per_day_limit
}
