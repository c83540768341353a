//! Allow/deny orchestration over the stats cache and the remote authority.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::config::GatekeeperConfig;
use crate::error::Result;
use crate::remote::{AuthorityClient, HttpAuthorityClient};

use super::cache::{unix_now, CacheEntry, StatsCache};
use super::window;

/// Outcome of a rate limit evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request fits within the key's quotas
    Allowed,
    /// The request must be rejected
    Denied(DenyReason),
}

impl Decision {
    /// Whether the request should proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// Reason a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The key is missing, empty, or its statistics could not be obtained
    InvalidKey,
    /// The minute or day quota is exhausted
    RateLimitExhausted,
}

/// Decides whether requests are allowed, consulting and caching per-key
/// statistics from the remote authority.
///
/// Construct one per process and share it (`Arc`) across callers; the
/// cache inside is thread-safe. With no authority configured, rate
/// limiting is administratively disabled and every request is allowed.
pub struct RateLimitGatekeeper {
    authority: Option<Arc<dyn AuthorityClient>>,
    cache: StatsCache,
}

impl RateLimitGatekeeper {
    /// Create a gatekeeper backed by the given authority client, or a
    /// disabled one when `None`.
    pub fn new(authority: Option<Arc<dyn AuthorityClient>>) -> Self {
        Self {
            authority,
            cache: StatsCache::new(),
        }
    }

    /// Create a gatekeeper with rate limiting administratively disabled.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Build a gatekeeper from configuration.
    ///
    /// An absent or empty endpoint URL yields a disabled gatekeeper, not
    /// an error.
    pub fn from_config(config: &GatekeeperConfig) -> Result<Self> {
        match config.authority.endpoint_url.as_deref() {
            Some(url) if !url.is_empty() => {
                let client = HttpAuthorityClient::new(
                    url,
                    config.authority.api_key.clone(),
                    Duration::from_secs(config.authority.request_timeout_secs),
                )?;
                Ok(Self::new(Some(Arc::new(client))))
            }
            _ => Ok(Self::disabled()),
        }
    }

    /// Whether rate limiting is enabled.
    pub fn is_enabled(&self) -> bool {
        self.authority.is_some()
    }

    /// Decide whether a request for `api_key` against `service` is allowed.
    ///
    /// Fail-closed: an empty key, or statistics that cannot be obtained
    /// from either the cache or the authority, deny the request. The
    /// evaluation itself has no side effect on the cache.
    pub async fn evaluate(&self, api_key: &str, service: &str) -> Decision {
        if self.authority.is_none() {
            return Decision::Allowed;
        }

        if api_key.is_empty() {
            return Decision::Denied(DenyReason::InvalidKey);
        }

        let Some(entry) = self.stats_for(api_key, service).await else {
            warn!(api_key = %api_key, "Unable to obtain stats for API key");
            return Decision::Denied(DenyReason::InvalidKey);
        };

        let window_end = window::check_window(entry.fetched_at, unix_now());
        if window::within_limits(&entry.stats, window_end) {
            Decision::Allowed
        } else {
            debug!(
                api_key = %api_key,
                service = %service,
                tier = %entry.stats.tier_name,
                "Rate limit exhausted"
            );
            Decision::Denied(DenyReason::RateLimitExhausted)
        }
    }

    /// Report a usage event to the authority and record it locally.
    ///
    /// The remote report is attempted first; the local cache update is
    /// always attempted afterwards, regardless of the remote outcome. The
    /// two are best-effort bookkeeping, not transactional. A remote
    /// failure is logged and swallowed.
    pub async fn report_event(&self, api_key: &str, service: &str, event_type: &str, user_ip: &str) {
        let Some(authority) = &self.authority else {
            return;
        };

        if self.stats_for(api_key, service).await.is_none() {
            warn!(api_key = %api_key, "Unable to obtain stats for API key");
            return;
        }

        match authority.report(api_key, service, event_type, user_ip).await {
            Ok(event_id) => {
                debug!(event_id = %event_id, api_key = %api_key, "Event recorded by authority")
            }
            Err(e) => {
                error!(error = %e, "Failed to report event to authority");
                warn!("Unable to keep track of events currently");
            }
        }

        if !self.cache.record_event(api_key) {
            warn!(api_key = %api_key, "Unable to add event for API key");
        }
    }

    /// Get a valid cache entry for the key, fetching from the authority on
    /// miss or expiry.
    ///
    /// The fetch runs with no cache lock held; the result is installed
    /// double-checked so a fresher concurrent fetch is not clobbered.
    async fn stats_for(&self, api_key: &str, service: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.cache.get_if_valid(api_key) {
            return Some(entry);
        }

        let authority = self.authority.as_ref()?;
        match authority.check(api_key, service).await {
            Ok(stats) => Some(self.cache.put_if_stale(api_key, stats, unix_now())),
            Err(e) => {
                error!(
                    error = %e,
                    api_key = %api_key,
                    service = %service,
                    "Failed to fetch stats from authority"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::ratelimit::StatsSnapshot;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Authority double: serves a fixed snapshot (or a simulated transport
    /// failure) and counts calls.
    struct MockAuthority {
        stats: Option<StatsSnapshot>,
        report_ok: bool,
        check_calls: AtomicUsize,
        report_calls: AtomicUsize,
    }

    impl MockAuthority {
        fn serving(stats: StatsSnapshot) -> Arc<Self> {
            Arc::new(Self {
                stats: Some(stats),
                report_ok: true,
                check_calls: AtomicUsize::new(0),
                report_calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                stats: None,
                report_ok: true,
                check_calls: AtomicUsize::new(0),
                report_calls: AtomicUsize::new(0),
            })
        }

        fn with_failing_reports(stats: StatsSnapshot) -> Arc<Self> {
            Arc::new(Self {
                stats: Some(stats),
                report_ok: false,
                check_calls: AtomicUsize::new(0),
                report_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AuthorityClient for MockAuthority {
        async fn check(
            &self,
            _api_key: &str,
            _service: &str,
        ) -> std::result::Result<StatsSnapshot, RemoteError> {
            self.check_calls.fetch_add(1, Ordering::SeqCst);
            match &self.stats {
                Some(stats) => Ok(stats.clone()),
                None => Err(RemoteError::Status(
                    reqwest::StatusCode::SERVICE_UNAVAILABLE,
                )),
            }
        }

        async fn report(
            &self,
            _api_key: &str,
            _service: &str,
            _event_type: &str,
            _ip_address: &str,
        ) -> std::result::Result<String, RemoteError> {
            self.report_calls.fetch_add(1, Ordering::SeqCst);
            if self.report_ok {
                Ok("evt-1".to_string())
            } else {
                Err(RemoteError::Status(
                    reqwest::StatusCode::SERVICE_UNAVAILABLE,
                ))
            }
        }
    }

    fn snapshot(offsets: Vec<f64>, minute_limit: u64, last_day: u64, day_limit: u64) -> StatsSnapshot {
        StatsSnapshot {
            api_key: "key-1".to_string(),
            tier_name: "standard".to_string(),
            service: "chat".to_string(),
            requests_last_minute: offsets.len() as u64,
            request_timestamp_offsets: offsets,
            requests_last_day: last_day,
            requests_per_minute_limit: minute_limit,
            requests_per_day_limit: day_limit,
            cache_timeout: 60.0,
        }
    }

    fn gatekeeper(authority: Arc<MockAuthority>) -> RateLimitGatekeeper {
        RateLimitGatekeeper::new(Some(authority))
    }

    #[tokio::test]
    async fn test_disabled_gatekeeper_allows_everything() {
        let gk = RateLimitGatekeeper::disabled();
        assert!(!gk.is_enabled());
        assert_eq!(gk.evaluate("key-1", "chat").await, Decision::Allowed);
        assert_eq!(gk.evaluate("", "chat").await, Decision::Allowed);
    }

    #[tokio::test]
    async fn test_empty_key_is_denied_without_a_fetch() {
        let authority = MockAuthority::serving(snapshot(vec![], 5, 0, 100));
        let gk = gatekeeper(authority.clone());

        let decision = gk.evaluate("", "chat").await;
        assert_eq!(decision, Decision::Denied(DenyReason::InvalidKey));
        assert_eq!(authority.check_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_fetch_fails_closed() {
        let authority = MockAuthority::failing();
        let gk = gatekeeper(authority);

        let decision = gk.evaluate("key-1", "chat").await;
        assert_eq!(decision, Decision::Denied(DenyReason::InvalidKey));
    }

    #[tokio::test]
    async fn test_allows_with_headroom_in_both_quotas() {
        let authority = MockAuthority::serving(snapshot(
            vec![-40.0, -30.0, -20.0, -10.0],
            5,
            10,
            100,
        ));
        let gk = gatekeeper(authority);

        assert_eq!(gk.evaluate("key-1", "chat").await, Decision::Allowed);
    }

    #[tokio::test]
    async fn test_denies_when_the_minute_window_is_full() {
        let authority = MockAuthority::serving(snapshot(
            vec![-50.0, -40.0, -30.0, -20.0, -10.0],
            5,
            10,
            100,
        ));
        let gk = gatekeeper(authority);

        assert_eq!(
            gk.evaluate("key-1", "chat").await,
            Decision::Denied(DenyReason::RateLimitExhausted)
        );
    }

    #[tokio::test]
    async fn test_day_limit_denies_even_with_an_empty_minute_window() {
        let authority = MockAuthority::serving(snapshot(vec![], 5, 100, 100));
        let gk = gatekeeper(authority);

        assert_eq!(
            gk.evaluate("key-1", "chat").await,
            Decision::Denied(DenyReason::RateLimitExhausted)
        );
    }

    #[tokio::test]
    async fn test_evaluation_reuses_the_cached_snapshot() {
        let authority = MockAuthority::serving(snapshot(vec![], 5, 0, 100));
        let gk = gatekeeper(authority.clone());

        assert!(gk.evaluate("key-1", "chat").await.is_allowed());
        assert!(gk.evaluate("key-1", "chat").await.is_allowed());
        assert_eq!(authority.check_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_evaluation_does_not_mutate_the_cache() {
        let authority = MockAuthority::serving(snapshot(vec![-10.0], 5, 7, 100));
        let gk = gatekeeper(authority);

        gk.evaluate("key-1", "chat").await;
        gk.evaluate("key-1", "chat").await;

        let entry = gk.cache.get_if_valid("key-1").unwrap();
        assert_eq!(entry.stats.request_timestamp_offsets.len(), 1);
        assert_eq!(entry.stats.requests_last_day, 7);
    }

    #[tokio::test]
    async fn test_report_event_reaches_the_authority_and_the_cache() {
        let authority = MockAuthority::serving(snapshot(vec![], 5, 0, 100));
        let gk = gatekeeper(authority.clone());

        gk.report_event("key-1", "chat", "request_served", "203.0.113.9")
            .await;

        assert_eq!(authority.report_calls.load(Ordering::SeqCst), 1);
        let entry = gk.cache.get_if_valid("key-1").unwrap();
        assert_eq!(entry.stats.request_timestamp_offsets.len(), 1);
        assert_eq!(entry.stats.requests_last_day, 1);
    }

    #[tokio::test]
    async fn test_report_event_records_locally_when_the_remote_report_fails() {
        let authority = MockAuthority::with_failing_reports(snapshot(vec![], 5, 0, 100));
        let gk = gatekeeper(authority.clone());

        gk.report_event("key-1", "chat", "request_served", "203.0.113.9")
            .await;

        assert_eq!(authority.report_calls.load(Ordering::SeqCst), 1);
        let entry = gk.cache.get_if_valid("key-1").unwrap();
        assert_eq!(entry.stats.request_timestamp_offsets.len(), 1);
        assert_eq!(entry.stats.requests_last_day, 1);
    }

    #[tokio::test]
    async fn test_report_event_aborts_when_stats_are_unobtainable() {
        let authority = MockAuthority::failing();
        let gk = gatekeeper(authority.clone());

        gk.report_event("key-1", "chat", "request_served", "203.0.113.9")
            .await;

        assert_eq!(authority.report_calls.load(Ordering::SeqCst), 0);
        assert!(gk.cache.is_empty());
    }

    #[tokio::test]
    async fn test_report_event_is_a_noop_when_disabled() {
        let gk = RateLimitGatekeeper::disabled();
        gk.report_event("key-1", "chat", "request_served", "203.0.113.9")
            .await;
        assert!(gk.cache.is_empty());
    }

    #[tokio::test]
    async fn test_reported_events_tighten_the_next_evaluation() {
        // Four of five slots used at fetch time; one reported event uses
        // the last one.
        let authority = MockAuthority::serving(snapshot(
            vec![-40.0, -30.0, -20.0, -10.0],
            5,
            10,
            100,
        ));
        let gk = gatekeeper(authority);

        assert!(gk.evaluate("key-1", "chat").await.is_allowed());
        gk.report_event("key-1", "chat", "request_served", "203.0.113.9")
            .await;
        assert_eq!(
            gk.evaluate("key-1", "chat").await,
            Decision::Denied(DenyReason::RateLimitExhausted)
        );
    }
}
