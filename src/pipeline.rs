//! Run orchestration.
//!
//! A run crawls every keyword in every mode, isolates pass failures,
//! deduplicates the combined run collection, commits it to the store and
//! finally hands the store to the sync gateway.

use serde::Serialize;
use tracing::{info, warn};

use crate::crawl::{CrawlController, PassOutcome};
use crate::enrich::{CacheStats, EnrichmentCache};
use crate::error::{HarvestError, Result};
use crate::fingerprint::{dedupe, duplicate_count};
use crate::model::{Record, RunSummary, SearchMode};
use crate::provider::DocumentProvider;
use crate::store::{AggregationStore, RunContext};
use crate::sync::{SyncGateway, SyncStatus, commit_message};

/// What one pass did, flattened for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub keyword: String,
    pub mode: SearchMode,
    pub records: usize,
    pub cycles: u32,
    pub skipped: usize,
    pub duplicates: usize,
    pub stop: Option<String>,
    /// Set when the pass failed; nothing from it reached the run.
    pub error: Option<String>,
}

impl PassReport {
    fn completed(keyword: &str, mode: SearchMode, outcome: &PassOutcome) -> Self {
        Self {
            keyword: keyword.to_string(),
            mode,
            records: outcome.records.len(),
            cycles: outcome.cycles,
            skipped: outcome.skipped.len(),
            duplicates: outcome.duplicates,
            stop: outcome.stop.map(|s| s.to_string()),
            error: None,
        }
    }

    fn failed(keyword: &str, mode: SearchMode, error: &HarvestError) -> Self {
        Self {
            keyword: keyword.to_string(),
            mode,
            records: 0,
            cycles: 0,
            skipped: 0,
            duplicates: 0,
            stop: None,
            error: Some(error.to_string()),
        }
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Result of a committed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub summary: RunSummary,
    pub passes: Vec<PassReport>,
    /// Records dropped by run-level dedup (same post found by several passes).
    pub cross_pass_duplicates: usize,
    pub enrichment: EnrichmentReport,
    pub sync: SyncStatus,
}

impl RunReport {
    #[must_use]
    pub fn failed_passes(&self) -> usize {
        self.passes.iter().filter(|p| p.is_failed()).count()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentReport {
    pub hits: usize,
    pub misses: usize,
    pub failures: usize,
}

impl From<CacheStats> for EnrichmentReport {
    fn from(stats: CacheStats) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            failures: stats.failures,
        }
    }
}

/// Keywords and modes to crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestPlan {
    pub keywords: Vec<String>,
    pub modes: Vec<SearchMode>,
}

impl HarvestPlan {
    #[must_use]
    pub fn passes(&self) -> usize {
        self.keywords.len() * self.modes.len()
    }
}

/// Drives crawl passes into the store.
pub struct Harvester {
    controller: CrawlController,
    store: AggregationStore,
    sort_by_engagement: bool,
    gateway: Option<Box<dyn SyncGateway>>,
}

impl std::fmt::Debug for Harvester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harvester")
            .field("controller", &self.controller)
            .field("store", &self.store)
            .field("sort_by_engagement", &self.sort_by_engagement)
            .field("gateway", &self.gateway.is_some())
            .finish()
    }
}

impl Harvester {
    #[must_use]
    pub const fn new(controller: CrawlController, store: AggregationStore) -> Self {
        Self {
            controller,
            store,
            sort_by_engagement: true,
            gateway: None,
        }
    }

    #[must_use]
    pub const fn sort_by_engagement(mut self, enabled: bool) -> Self {
        self.sort_by_engagement = enabled;
        self
    }

    #[must_use]
    pub fn with_gateway(mut self, gateway: Option<Box<dyn SyncGateway>>) -> Self {
        self.gateway = gateway;
        self
    }

    #[must_use]
    pub const fn store(&self) -> &AggregationStore {
        &self.store
    }

    /// Crawl every pass in the plan and commit the result.
    ///
    /// Failed passes are logged and reported; the run still commits what
    /// the other passes found.
    ///
    /// # Errors
    /// Returns an error only if persisting the run fails.
    pub fn run(
        &self,
        provider: &mut dyn DocumentProvider,
        cache: &mut EnrichmentCache,
        plan: &HarvestPlan,
        ctx: &RunContext,
    ) -> Result<RunReport> {
        info!(
            day = %ctx.day,
            stamp = %ctx.stamp,
            passes = plan.passes(),
            "Starting run"
        );

        let mut collected = Vec::new();
        let mut passes = Vec::with_capacity(plan.passes());

        for keyword in &plan.keywords {
            for &mode in &plan.modes {
                match self.controller.run_pass(provider, cache, keyword, mode) {
                    Ok(outcome) => {
                        passes.push(PassReport::completed(keyword, mode, &outcome));
                        collected.extend(outcome.records);
                    }
                    Err(source) => {
                        let err = HarvestError::pass_failed(format!("{keyword}/{mode}"), source);
                        warn!(error = %err, "Pass failed, continuing with the next one");
                        passes.push(PassReport::failed(keyword, mode, &err));
                    }
                }
            }
        }

        let mut report = self.commit(ctx, collected)?;
        report.passes = passes;
        report.enrichment = cache.stats().into();
        Ok(report)
    }

    /// Dedupe, optionally sort, persist and sync an already collected run.
    ///
    /// # Errors
    /// Returns an error if persisting the run fails. Sync failures are
    /// reported in [`RunReport::sync`] instead.
    pub fn commit(&self, ctx: &RunContext, collected: Vec<Record>) -> Result<RunReport> {
        let cross_pass_duplicates = duplicate_count(&collected);
        let records = self.prepare_run(collected);
        let summary = self.store.commit(ctx, &records)?;
        let sync = self.sync(&summary);

        Ok(RunReport {
            summary,
            passes: Vec::new(),
            cross_pass_duplicates,
            enrichment: EnrichmentReport::default(),
            sync,
        })
    }

    /// Dedupe first so the earliest pass wins, then order by engagement.
    #[must_use]
    pub fn prepare_run(&self, collected: Vec<Record>) -> Vec<Record> {
        let mut records = dedupe(collected);
        if self.sort_by_engagement {
            records.sort_by(|a, b| b.engagement_key().cmp(&a.engagement_key()));
        }
        records
    }

    fn sync(&self, summary: &RunSummary) -> SyncStatus {
        let Some(gateway) = &self.gateway else {
            return SyncStatus::Skipped;
        };
        let message = commit_message(summary);
        match gateway.publish(self.store.root(), &message) {
            Ok(()) => SyncStatus::Published { message },
            Err(e) => {
                warn!(error = %e, "Sync failed; the local store is complete");
                SyncStatus::Failed {
                    message,
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::{CommentSettings, CrawlSettings};
    use crate::model::Engagement;
    use crate::normalize::RecordNormalizer;
    use chrono::{TimeZone, Utc};
    use std::cell::RefCell;
    use std::path::Path;
    use tempfile::TempDir;

    struct RecordingGateway {
        messages: RefCell<Vec<String>>,
        fail: bool,
    }

    impl SyncGateway for RecordingGateway {
        fn publish(&self, _root: &Path, message: &str) -> Result<()> {
            self.messages.borrow_mut().push(message.to_string());
            if self.fail {
                Err(HarvestError::sync("remote rejected"))
            } else {
                Ok(())
            }
        }
    }

    fn harvester(dir: &Path) -> Harvester {
        let settings = CrawlSettings {
            comments: CommentSettings {
                enabled: false,
                ..CommentSettings::default()
            },
            ..CrawlSettings::default()
        }
        .without_delays();
        Harvester::new(
            CrawlController::new(settings, RecordNormalizer::default()),
            AggregationStore::new(dir),
        )
    }

    fn ctx() -> RunContext {
        RunContext::at(Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap())
    }

    fn liked(text: &str, like: u64) -> Record {
        Record {
            text: text.to_string(),
            engagement: Engagement {
                like,
                ..Engagement::default()
            },
            ..Record::default()
        }
    }

    #[test]
    fn prepare_run_dedupes_then_sorts_stably() {
        let dir = TempDir::new().unwrap();
        let h = harvester(dir.path());
        let out = h.prepare_run(vec![
            liked("a", 1),
            liked("b", 5),
            liked("a", 9),
            liked("c", 5),
        ]);
        let texts: Vec<&str> = out.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["b", "c", "a"]);
        assert_eq!(out[2].engagement.like, 1);
    }

    #[test]
    fn prepare_run_keeps_order_when_sorting_disabled() {
        let dir = TempDir::new().unwrap();
        let h = harvester(dir.path()).sort_by_engagement(false);
        let out = h.prepare_run(vec![liked("a", 1), liked("b", 5)]);
        assert_eq!(out[0].text, "a");
    }

    #[test]
    fn sync_receives_commit_message() {
        let dir = TempDir::new().unwrap();
        let gateway = Box::new(RecordingGateway {
            messages: RefCell::new(Vec::new()),
            fail: false,
        });
        let h = harvester(dir.path()).with_gateway(Some(gateway));
        let report = h.commit(&ctx(), vec![liked("hello world", 1)]).unwrap();
        assert_eq!(
            report.sync,
            SyncStatus::Published {
                message: "Scrape 2025-03-01 20250301T080000Z | run=1 daily=1 all=1".to_string()
            }
        );
    }

    #[test]
    fn sync_failure_keeps_the_store() {
        let dir = TempDir::new().unwrap();
        let gateway = Box::new(RecordingGateway {
            messages: RefCell::new(Vec::new()),
            fail: true,
        });
        let h = harvester(dir.path()).with_gateway(Some(gateway));
        let report = h.commit(&ctx(), vec![liked("hello world", 1)]).unwrap();
        assert!(matches!(report.sync, SyncStatus::Failed { .. }));
        assert_eq!(h.store().read_log().unwrap().len(), 1);
    }

    #[test]
    fn failed_passes_do_not_abort_the_run() {
        let dir = TempDir::new().unwrap();
        let h = harvester(dir.path());
        let mut provider = crate::provider::ReplayProvider::default();
        let mut cache = EnrichmentCache::disabled();
        let plan = HarvestPlan {
            keywords: vec!["bitcoin".to_string()],
            modes: SearchMode::all(),
        };

        let report = h.run(&mut provider, &mut cache, &plan, &ctx()).unwrap();
        assert_eq!(report.passes.len(), 2);
        assert_eq!(report.failed_passes(), 2);
        assert_eq!(report.summary.run_rows, 0);
        assert_eq!(report.sync, SyncStatus::Skipped);
    }
}
