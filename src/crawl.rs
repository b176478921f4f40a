//! Adaptive crawl controller.
//!
//! One pass crawls one keyword in one [`SearchMode`]. Each cycle asks the
//! provider for more content, waits a jittered delay, extracts articles and
//! folds the normalized records into the pass's deduplicated set. The pass
//! stops once `no_new_threshold` consecutive cycles add nothing new, or when
//! `max_cycles` is reached.
//!
//! Node-level problems (unusable articles, unreachable permalinks) are
//! recorded and skipped. Provider failures on the search page end the pass
//! and are returned to the caller untouched.

use std::thread;
use std::time::Duration;

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::enrich::EnrichmentCache;
use crate::extract::{SITE_ORIGIN, extract_nodes, extract_reply_nodes};
use crate::fingerprint::SeenSet;
use crate::model::{Comment, Record, SearchMode};
use crate::normalize::{RecordNormalizer, SkipReason};
use crate::provider::{DocumentProvider, ProviderError};

/// Search page for a keyword and mode.
#[must_use]
pub fn search_locator(keyword: &str, mode: SearchMode) -> String {
    let query = utf8_percent_encode(keyword.trim(), NON_ALPHANUMERIC);
    format!(
        "{SITE_ORIGIN}/search?q={query}&src=typed_query{}",
        mode.query_suffix()
    )
}

/// Blocking jittered delay between `min_ms` and `max_ms`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pacer {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Pacer {
    #[must_use]
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// A pacer that never sleeps.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, 0)
    }

    /// Pick a delay. Bounds given in the wrong order are swapped.
    #[must_use]
    pub fn next_delay(&self) -> Duration {
        let (lo, hi) = if self.min_ms <= self.max_ms {
            (self.min_ms, self.max_ms)
        } else {
            (self.max_ms, self.min_ms)
        };
        if hi == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(lo..=hi))
    }

    pub fn pause(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

/// Reply harvesting from a post's detail page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentSettings {
    pub enabled: bool,
    pub max_per_record: usize,
    pub scrolls: u32,
    pub settle: Duration,
}

impl Default for CommentSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_per_record: 5,
            scrolls: 3,
            settle: Duration::from_millis(3_000),
        }
    }
}

/// Tuning for one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlSettings {
    pub max_cycles: u32,
    pub no_new_threshold: u32,
    /// Wait after opening the search page.
    pub settle: Duration,
    pub cycle_delay: Pacer,
    pub record_delay: Pacer,
    pub comments: CommentSettings,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            max_cycles: 60,
            no_new_threshold: 5,
            settle: Duration::from_millis(6_000),
            cycle_delay: Pacer::new(2_000, 3_200),
            record_delay: Pacer::new(400, 900),
            comments: CommentSettings::default(),
        }
    }
}

impl CrawlSettings {
    /// Same settings with every wait removed.
    #[must_use]
    pub const fn without_delays(mut self) -> Self {
        self.settle = Duration::ZERO;
        self.cycle_delay = Pacer::none();
        self.record_delay = Pacer::none();
        self.comments.settle = Duration::ZERO;
        self
    }
}

/// Why a pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The no-new streak reached the threshold.
    NoNewRecords,
    /// `max_cycles` was reached first.
    CycleCap,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoNewRecords => f.write_str("no new records"),
            Self::CycleCap => f.write_str("cycle cap"),
        }
    }
}

/// A node that did not become a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedNode {
    /// Cycle the node was seen in; 0 is the initial page load.
    pub cycle: u32,
    pub reason: SkipReason,
}

/// Result of one pass.
#[derive(Debug, Clone, Default)]
pub struct PassOutcome {
    /// Newly seen records, in first-seen order.
    pub records: Vec<Record>,
    /// Content-pull cycles executed (the initial load is not a cycle).
    pub cycles: u32,
    pub stop: Option<StopReason>,
    pub skipped: Vec<SkippedNode>,
    /// Nodes dropped because their fingerprint was already in the pass.
    pub duplicates: usize,
    /// Permalinks whose detail page could not be read.
    pub comment_failures: usize,
}

/// Runs passes against a document provider.
#[derive(Debug, Clone, Copy)]
pub struct CrawlController {
    settings: CrawlSettings,
    normalizer: RecordNormalizer,
}

/// Mutable state of a running pass.
struct PassState<'a> {
    keyword: &'a str,
    mode: SearchMode,
    seen: SeenSet,
    outcome: PassOutcome,
}

impl CrawlController {
    #[must_use]
    pub const fn new(settings: CrawlSettings, normalizer: RecordNormalizer) -> Self {
        Self {
            settings,
            normalizer,
        }
    }

    /// Crawl one keyword in one mode.
    ///
    /// # Errors
    /// Returns the provider's error if the search page cannot be opened or
    /// read, or if the controller cannot return to it after visiting a
    /// permalink or a profile.
    pub fn run_pass(
        &self,
        provider: &mut dyn DocumentProvider,
        cache: &mut EnrichmentCache,
        keyword: &str,
        mode: SearchMode,
    ) -> Result<PassOutcome, ProviderError> {
        let locator = search_locator(keyword, mode);
        info!(keyword, %mode, %locator, "Starting pass");

        let initial = provider.navigate_to(&locator)?;
        sleep(self.settings.settle);

        let mut state = PassState {
            keyword,
            mode,
            seen: SeenSet::new(),
            outcome: PassOutcome::default(),
        };
        self.harvest(provider, cache, &mut state, &initial, 0)?;

        let mut streak = 0_u32;
        for cycle in 1..=self.settings.max_cycles {
            provider.advance_viewport()?;
            self.settings.cycle_delay.pause();
            let markup = provider.current_content()?;

            let added = self.harvest(provider, cache, &mut state, &markup, cycle)?;
            state.outcome.cycles = cycle;

            if added > 0 {
                streak = 0;
            } else {
                streak += 1;
            }
            debug!(
                keyword,
                %mode,
                cycle,
                added,
                total = state.outcome.records.len(),
                streak,
                "Cycle complete"
            );

            if streak >= self.settings.no_new_threshold {
                state.outcome.stop = Some(StopReason::NoNewRecords);
                break;
            }
        }

        let mut outcome = state.outcome;
        if outcome.stop.is_none() {
            outcome.stop = Some(StopReason::CycleCap);
        }
        info!(
            keyword,
            %mode,
            records = outcome.records.len(),
            cycles = outcome.cycles,
            skipped = outcome.skipped.len(),
            duplicates = outcome.duplicates,
            stop = %outcome.stop.unwrap_or(StopReason::CycleCap),
            "Pass finished"
        );
        Ok(outcome)
    }

    /// Fold one page of markup into the pass; returns how many records were new.
    fn harvest(
        &self,
        provider: &mut dyn DocumentProvider,
        cache: &mut EnrichmentCache,
        state: &mut PassState<'_>,
        markup: &str,
        cycle: u32,
    ) -> Result<usize, ProviderError> {
        let mut added = 0;

        for node in extract_nodes(markup) {
            let mut record = match self.normalizer.prepare(&node, state.keyword, state.mode) {
                Ok(record) => record,
                Err(reason) => {
                    debug!(cycle, %reason, "Skipping node");
                    state.outcome.skipped.push(SkippedNode { cycle, reason });
                    continue;
                }
            };

            if !state.seen.insert_record(&record) {
                state.outcome.duplicates += 1;
                continue;
            }

            self.normalizer.enrich(&mut record, cache, provider)?;
            if self.settings.comments.enabled {
                if let Some(url) = record.identity_url.clone() {
                    match self.harvest_comments(provider, &url)? {
                        Some(comments) => record.set_comments(comments),
                        None => state.outcome.comment_failures += 1,
                    }
                }
            }

            state.outcome.records.push(record);
            added += 1;
            self.settings.record_delay.pause();
        }

        Ok(added)
    }

    /// Visit a permalink and collect replies.
    ///
    /// `Ok(None)` means the detail page could not be read and the record
    /// keeps zero comments. Only a failed return to the search page is an
    /// error.
    fn harvest_comments(
        &self,
        provider: &mut dyn DocumentProvider,
        url: &str,
    ) -> Result<Option<Vec<Comment>>, ProviderError> {
        let settings = &self.settings.comments;

        if let Err(e) = provider.navigate_to(url) {
            warn!(%url, error = %e, "Could not open permalink, keeping zero comments");
            return Ok(None);
        }
        sleep(settings.settle);

        let markup = (0..settings.scrolls)
            .try_for_each(|_| provider.advance_viewport())
            .and_then(|()| provider.current_content());

        let comments = match markup {
            Ok(markup) => Some(
                extract_reply_nodes(&markup, settings.max_per_record)
                    .iter()
                    .filter_map(|node| self.normalizer.normalize_comment(node).ok())
                    .collect(),
            ),
            Err(e) => {
                warn!(%url, error = %e, "Could not read permalink, keeping zero comments");
                None
            }
        };

        provider.go_back()?;
        Ok(comments)
    }
}

fn sleep(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}
