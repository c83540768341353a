//! Per-key usage statistics reported by the remote authority.

use serde::{Deserialize, Serialize};

/// A point-in-time copy of an API key's usage statistics.
///
/// Decoded from the authority's JSON response; a missing or mis-typed
/// field is a decode error, never a silently absent value. Counters
/// describe the key's standing at fetch time. Locally observed events are
/// appended to `request_timestamp_offsets` between refreshes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// The API key these statistics belong to
    pub api_key: String,
    /// Name of the pricing tier the key is on
    pub tier_name: String,
    /// The service the quota applies to
    pub service: String,
    /// Requests counted in the minute before fetch time
    pub requests_last_minute: u64,
    /// Recent request times as signed second deltas relative to fetch
    /// time (past events are negative)
    #[serde(rename = "requestTimestampsDelta")]
    pub request_timestamp_offsets: Vec<f64>,
    /// Requests counted in the day before fetch time
    pub requests_last_day: u64,
    /// Per-minute request quota
    pub requests_per_minute_limit: u64,
    /// Per-day request quota
    pub requests_per_day_limit: u64,
    /// Seconds this snapshot remains valid before a refetch is required
    pub cache_timeout: f64,
}
