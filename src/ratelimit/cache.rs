//! In-memory cache of per-key usage statistics.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use super::stats::StatsSnapshot;

/// Current time as fractional seconds since the Unix epoch.
pub(crate) fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs_f64()
}

/// A cached snapshot together with the time it was fetched.
///
/// The entry is valid while `now - fetched_at <= cache_timeout`; an expired
/// entry is treated as absent and replaced wholesale by the next successful
/// fetch. Events recorded locally after `fetched_at` live only in this
/// entry and are lost when it is replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// The statistics as fetched, plus locally recorded events
    pub stats: StatsSnapshot,
    /// Seconds since the Unix epoch at fetch time
    pub fetched_at: f64,
}

/// Process-local cache mapping API keys to their statistics.
///
/// This struct owns all cached entries and is thread-safe: every operation
/// takes the map lock, and the lock is never held across network I/O.
pub struct StatsCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl StatsCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the entry for `api_key` if it exists and has not expired.
    ///
    /// No side effects; expired entries are left in place for the next
    /// `put` to overwrite.
    pub fn get_if_valid(&self, api_key: &str) -> Option<CacheEntry> {
        self.get_if_valid_at(api_key, unix_now())
    }

    fn get_if_valid_at(&self, api_key: &str, now: f64) -> Option<CacheEntry> {
        let entries = self.entries.read();
        let entry = entries.get(api_key)?;
        if now - entry.fetched_at > entry.stats.cache_timeout {
            // Cache has expired
            return None;
        }
        Some(entry.clone())
    }

    /// Unconditionally overwrite the entry for `api_key`.
    pub fn put(&self, api_key: &str, stats: StatsSnapshot, fetched_at: f64) {
        let mut entries = self.entries.write();
        entries.insert(api_key.to_string(), CacheEntry { stats, fetched_at });
    }

    /// Install a freshly fetched snapshot unless a concurrent fetch already
    /// installed a fresher one.
    ///
    /// Fetches run without the map lock, so two callers can fetch for the
    /// same key at once. The re-check and the overwrite happen under a
    /// single write-lock acquisition; whichever entry ends up cached is
    /// returned.
    pub fn put_if_stale(&self, api_key: &str, stats: StatsSnapshot, fetched_at: f64) -> CacheEntry {
        self.put_if_stale_at(api_key, stats, fetched_at, unix_now())
    }

    fn put_if_stale_at(
        &self,
        api_key: &str,
        stats: StatsSnapshot,
        fetched_at: f64,
        now: f64,
    ) -> CacheEntry {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(api_key) {
            let still_valid = now - existing.fetched_at <= existing.stats.cache_timeout;
            if still_valid && existing.fetched_at >= fetched_at {
                return existing.clone();
            }
        }
        let entry = CacheEntry { stats, fetched_at };
        entries.insert(api_key.to_string(), entry.clone());
        entry
    }

    /// Record a locally observed request event against the cached entry.
    ///
    /// Appends a timestamp offset of `fetched_at - now` (negative, matching
    /// the fetch-relative convention of the snapshot's offsets) and bumps
    /// the day counter. Returns `false` when no entry exists for the key;
    /// the caller should log and continue.
    pub fn record_event(&self, api_key: &str) -> bool {
        self.record_event_at(api_key, unix_now())
    }

    fn record_event_at(&self, api_key: &str, now: f64) -> bool {
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(api_key) else {
            return false;
        };
        entry
            .stats
            .request_timestamp_offsets
            .push(entry.fetched_at - now);
        entry.stats.requests_last_day += 1;
        true
    }

    /// Get the number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Clear all entries.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl Default for StatsCache {
    fn default() -> Self {
        Self::new()
    }
}
