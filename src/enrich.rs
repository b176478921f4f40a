//! Enrichment cache for author follower/following counts.
//!
//! Profile visits are slow and get rate limited, so each username is fetched
//! at most once per run. Failures are retried a bounded number of times on
//! transient signatures and then degrade to zero counts. Zero results are
//! cached like any other.
//!
//! The one error that does reach the caller is [`FetchError::Stranded`]:
//! the provider could not return from the profile page, so whatever it
//! shows next is not the page the caller was reading.

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::extract::{SITE_ORIGIN, extract_profile_counts, is_interstitial};
use crate::model::ProfileCounts;
use crate::provider::{DocumentProvider, ProviderError};

/// Longest single back-off sleep.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Why a profile fetch did not produce counts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Rate limit, error interstitial, or a page that has not rendered yet.
    #[error("transient profile failure: {reason}")]
    Transient { reason: String },

    /// Retrying will not help.
    #[error("profile unavailable: {reason}")]
    Permanent { reason: String },

    /// The profile was opened but the provider could not go back.
    #[error("stuck on profile page")]
    Stranded(#[source] ProviderError),
}

impl FetchError {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::Permanent {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// The expensive lookup behind the cache.
pub trait ProfileFetcher {
    /// Fetch counts for one username.
    ///
    /// # Errors
    /// Returns [`FetchError::Transient`] for failures worth retrying.
    fn fetch(
        &mut self,
        provider: &mut dyn DocumentProvider,
        username: &str,
    ) -> Result<ProfileCounts, FetchError>;
}

/// Fetcher used when enrichment is disabled. Always zero, never any I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFetcher;

impl ProfileFetcher for NoopFetcher {
    fn fetch(
        &mut self,
        _provider: &mut dyn DocumentProvider,
        _username: &str,
    ) -> Result<ProfileCounts, FetchError> {
        Ok(ProfileCounts::default())
    }
}

/// Visits `https://x.com/<username>` through the document provider.
///
/// Navigates back to the previous page after every successful navigation,
/// whatever the outcome of the read. A failed return wins over the read.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageProfileFetcher {
    settle: Duration,
}

impl PageProfileFetcher {
    #[must_use]
    pub const fn new(settle: Duration) -> Self {
        Self { settle }
    }

    fn read_counts(
        &self,
        provider: &mut dyn DocumentProvider,
    ) -> Result<ProfileCounts, FetchError> {
        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }
        let markup = provider
            .current_content()
            .map_err(|e| FetchError::transient(e.to_string()))?;
        if is_interstitial(&markup) {
            return Err(FetchError::transient("interstitial page"));
        }
        extract_profile_counts(&markup)
            .ok_or_else(|| FetchError::transient("profile counters not rendered"))
    }
}

/// Profile URL for a username.
#[must_use]
pub fn profile_locator(username: &str) -> String {
    format!("{SITE_ORIGIN}/{username}")
}

impl ProfileFetcher for PageProfileFetcher {
    fn fetch(
        &mut self,
        provider: &mut dyn DocumentProvider,
        username: &str,
    ) -> Result<ProfileCounts, FetchError> {
        let locator = profile_locator(username);
        provider
            .navigate_to(&locator)
            .map_err(|e| FetchError::transient(e.to_string()))?;

        let result = self.read_counts(provider);
        provider.go_back().map_err(FetchError::Stranded)?;
        result
    }
}

/// Bounded retry with exponential back-off and jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    /// Base delay; doubled per attempt. Zero disables sleeping.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_ms: 1_500,
        }
    }
}

impl RetryPolicy {
    /// A policy that retries immediately, for tests and replays.
    #[must_use]
    pub const fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff_ms: 0,
        }
    }

    /// Sleep before retry number `attempt` (1-based), ±25% jitter.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.backoff_ms == 0 {
            return Duration::ZERO;
        }
        let shift = attempt.saturating_sub(1).min(10);
        let capped = self
            .backoff_ms
            .saturating_mul(1_u64 << shift)
            .min(MAX_BACKOFF_MS);
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let jittered = (capped as f64 * rand::random::<f64>().mul_add(0.5, 0.75)) as u64;
        Duration::from_millis(jittered)
    }

    /// Run `operation`, retrying transient failures.
    ///
    /// # Errors
    /// Returns the last error once retries are exhausted, or the first
    /// permanent error.
    pub fn run<T>(
        &self,
        mut operation: impl FnMut() -> Result<T, FetchError>,
    ) -> Result<T, FetchError> {
        let mut attempt = 0_u32;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !err.is_transient() || attempt >= self.max_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Profile fetch failed, retrying after back-off"
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
            }
        }
    }
}

/// Cache counters, reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    /// Misses whose fetch failed and were cached as zero.
    pub failures: usize,
}

/// Per-run memo of profile counts keyed by username.
pub struct EnrichmentCache {
    fetcher: Box<dyn ProfileFetcher>,
    policy: RetryPolicy,
    entries: HashMap<String, ProfileCounts>,
    stats: CacheStats,
    enabled: bool,
}

impl std::fmt::Debug for EnrichmentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichmentCache")
            .field("policy", &self.policy)
            .field("entries", &self.entries.len())
            .field("stats", &self.stats)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl EnrichmentCache {
    #[must_use]
    pub fn new(fetcher: Box<dyn ProfileFetcher>) -> Self {
        Self::with_policy(fetcher, RetryPolicy::default())
    }

    #[must_use]
    pub fn with_policy(fetcher: Box<dyn ProfileFetcher>, policy: RetryPolicy) -> Self {
        Self {
            fetcher,
            policy,
            entries: HashMap::new(),
            stats: CacheStats::default(),
            enabled: true,
        }
    }

    /// A cache that never fetches and keeps no statistics.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::with_policy(Box::new(NoopFetcher), RetryPolicy::immediate(0))
        }
    }

    /// Counts for `username`, fetching on first use.
    ///
    /// Usernames are compared case-insensitively.
    ///
    /// # Errors
    /// Returns the provider's error when it could not leave the profile
    /// page. Nothing is cached in that case. Every other failure degrades
    /// to zero counts.
    pub fn lookup(
        &mut self,
        provider: &mut dyn DocumentProvider,
        username: &str,
    ) -> Result<ProfileCounts, ProviderError> {
        if !self.enabled {
            return Ok(ProfileCounts::default());
        }
        let key = username.trim().to_lowercase();
        if let Some(counts) = self.entries.get(&key) {
            self.stats.hits += 1;
            return Ok(*counts);
        }

        self.stats.misses += 1;
        let fetcher = &mut self.fetcher;
        let counts = match self.policy.run(|| fetcher.fetch(&mut *provider, username)) {
            Ok(counts) => {
                debug!(
                    username,
                    followers = counts.followers,
                    following = counts.following,
                    "Fetched profile counts"
                );
                counts
            }
            Err(FetchError::Stranded(e)) => {
                self.stats.failures += 1;
                warn!(username, error = %e, "Could not return from profile page");
                return Err(e);
            }
            Err(e) => {
                self.stats.failures += 1;
                warn!(username, error = %e, "Profile enrichment degraded to zero counts");
                ProfileCounts::default()
            }
        };

        self.entries.insert(key, counts);
        Ok(counts)
    }

    #[must_use]
    pub const fn stats(&self) -> CacheStats {
        self.stats
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ReplayProvider;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Fails transiently `failures` times per username, then succeeds.
    struct CountingFetcher {
        calls: Rc<Cell<usize>>,
        failures: usize,
        result: Result<ProfileCounts, FetchError>,
    }

    impl ProfileFetcher for CountingFetcher {
        fn fetch(
            &mut self,
            _provider: &mut dyn DocumentProvider,
            _username: &str,
        ) -> Result<ProfileCounts, FetchError> {
            self.calls.set(self.calls.get() + 1);
            if self.calls.get() <= self.failures {
                return Err(FetchError::transient("rate limited"));
            }
            self.result.clone()
        }
    }

    fn counting(
        failures: usize,
        result: Result<ProfileCounts, FetchError>,
    ) -> (Box<CountingFetcher>, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        (
            Box::new(CountingFetcher {
                calls: Rc::clone(&calls),
                failures,
                result,
            }),
            calls,
        )
    }

    const COUNTS: ProfileCounts = ProfileCounts {
        followers: 120,
        following: 7,
    };

    #[test]
    fn second_lookup_is_a_cache_hit() {
        let (fetcher, calls) = counting(0, Ok(COUNTS));
        let mut cache = EnrichmentCache::with_policy(fetcher, RetryPolicy::immediate(2));
        let mut provider = ReplayProvider::default();

        assert_eq!(cache.lookup(&mut provider, "alice").unwrap(), COUNTS);
        assert_eq!(cache.lookup(&mut provider, "Alice").unwrap(), COUNTS);
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn transient_failures_are_retried() {
        let (fetcher, calls) = counting(2, Ok(COUNTS));
        let mut cache = EnrichmentCache::with_policy(fetcher, RetryPolicy::immediate(2));
        let mut provider = ReplayProvider::default();

        assert_eq!(cache.lookup(&mut provider, "bob").unwrap(), COUNTS);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn exhausted_retries_cache_zero() {
        let (fetcher, calls) = counting(usize::MAX, Ok(COUNTS));
        let mut cache = EnrichmentCache::with_policy(fetcher, RetryPolicy::immediate(1));
        let mut provider = ReplayProvider::default();

        assert_eq!(cache.lookup(&mut provider, "carol").unwrap(), ProfileCounts::default());
        assert_eq!(calls.get(), 2);
        assert_eq!(cache.lookup(&mut provider, "carol").unwrap(), ProfileCounts::default());
        assert_eq!(calls.get(), 2);
        assert_eq!(cache.stats().failures, 1);
    }

    #[test]
    fn permanent_failures_are_not_retried() {
        let (fetcher, calls) = counting(0, Err(FetchError::permanent("suspended")));
        let mut cache = EnrichmentCache::with_policy(fetcher, RetryPolicy::immediate(5));
        let mut provider = ReplayProvider::default();

        assert_eq!(cache.lookup(&mut provider, "dave").unwrap(), ProfileCounts::default());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn page_fetcher_reads_profile_and_returns() {
        let mut provider = ReplayProvider::default();
        provider.insert_page("feed", vec!["<p>feed</p>".to_string()]);
        provider.insert_page(
            profile_locator("alice"),
            vec![
                r#"<a href="/alice/following"><span>12</span> Following</a>
                   <a href="/alice/followers"><span>3.4K</span> Followers</a>"#
                    .to_string(),
            ],
        );
        provider.navigate_to("feed").unwrap();

        let mut fetcher = PageProfileFetcher::default();
        let counts = fetcher.fetch(&mut provider, "alice").unwrap();
        assert_eq!(counts.followers, 3_400);
        assert_eq!(counts.following, 12);
        assert_eq!(provider.current_content().unwrap(), "<p>feed</p>");
    }

    #[test]
    fn page_fetcher_flags_interstitial_as_transient() {
        let mut provider = ReplayProvider::default();
        provider.insert_page("feed", vec!["<p>feed</p>".to_string()]);
        provider.insert_page(
            profile_locator("bob"),
            vec!["<div>Something went wrong. Try reloading.</div>".to_string()],
        );
        provider.navigate_to("feed").unwrap();

        let err = PageProfileFetcher::default()
            .fetch(&mut provider, "bob")
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(provider.current_content().unwrap(), "<p>feed</p>");
    }

    /// Replay provider whose `go_back` always fails.
    struct OneWayProvider(ReplayProvider);

    impl DocumentProvider for OneWayProvider {
        fn current_content(&mut self) -> Result<String, ProviderError> {
            self.0.current_content()
        }

        fn advance_viewport(&mut self) -> Result<(), ProviderError> {
            self.0.advance_viewport()
        }

        fn navigate_to(&mut self, locator: &str) -> Result<String, ProviderError> {
            self.0.navigate_to(locator)
        }

        fn go_back(&mut self) -> Result<(), ProviderError> {
            Err(ProviderError::unavailable("tab crashed"))
        }
    }

    #[test]
    fn failed_return_from_profile_is_an_error() {
        let mut inner = ReplayProvider::default();
        inner.insert_page("feed", vec!["<p>feed</p>".to_string()]);
        inner.insert_page(
            profile_locator("erin"),
            vec![r#"<a href="/erin/followers"><span>9</span> Followers</a>"#.to_string()],
        );
        inner.navigate_to("feed").unwrap();
        let mut provider = OneWayProvider(inner);

        let err = PageProfileFetcher::default()
            .fetch(&mut provider, "erin")
            .unwrap_err();
        assert!(matches!(err, FetchError::Stranded(_)));
        assert!(!err.is_transient());

        let mut cache = EnrichmentCache::with_policy(
            Box::new(PageProfileFetcher::default()),
            RetryPolicy::immediate(3),
        );
        let err = cache.lookup(&mut provider, "erin").unwrap_err();
        assert_eq!(err, ProviderError::unavailable("tab crashed"));
        assert!(cache.is_empty());
    }

    #[test]
    fn delay_grows_and_zero_backoff_never_sleeps() {
        assert_eq!(RetryPolicy::immediate(3).delay_for(2), Duration::ZERO);
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_ms: 1_000,
        };
        let first = policy.delay_for(1).as_millis();
        let third = policy.delay_for(3).as_millis();
        assert!((750..=1_250).contains(&first));
        assert!((3_000..=5_000).contains(&third));
    }
}
