//! xharvest - adaptive X search harvester
//!
//! This library turns rendered X search pages into normalized post records
//! and maintains run, daily and all-time deduplicated datasets on disk.
//!
//! # Modules
//!
//! - [`provider`] - Document provider boundary and page replay
//! - [`extract`] - HTML extraction of articles and profile counters
//! - [`normalize`] - Raw node to record mapping with typed skip reasons
//! - [`enrich`] - Per-run cache of author follower/following counts
//! - [`crawl`] - Adaptive crawl controller for one keyword and mode
//! - [`fingerprint`] - Record identity and deduplication
//! - [`store`] - Run, daily, all-time collections and the run log
//! - [`pipeline`] - Run orchestration across passes
//! - [`sync`] - Hand-off of the finished store to a publisher
//! - [`doctor`] - Store health checks
//! - [`error`] - Custom error types with rich context

pub mod cli;
pub mod config;
pub mod crawl;
pub mod doctor;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod numeric;
pub mod pipeline;
pub mod provider;
pub mod store;
pub mod sync;

pub use cli::*;
pub use error::{HarvestError, Result, ResultExt, format_error, format_harvest_error};
pub use model::*;
pub use pipeline::{HarvestPlan, Harvester, RunReport};
pub use provider::{DocumentProvider, ReplayProvider};
pub use store::{AggregationStore, RunContext};

/// Standard width for content dividers in CLI output
pub const CONTENT_DIVIDER_WIDTH: usize = 60;

/// Get the default data directory for xharvest
#[must_use]
pub fn default_data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("xharvest")
}

/// Get the default store root
#[must_use]
pub fn default_store_dir() -> std::path::PathBuf {
    default_data_dir().join("data")
}

/// Format an unsigned integer with thousands separators.
#[must_use]
pub fn format_number_u64(value: u64) -> String {
    let mut out = String::with_capacity(24);

    for (idx, ch) in value.to_string().chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    out.chars().rev().collect()
}

/// Format a usize with thousands separators.
#[must_use]
pub fn format_number_usize(value: usize) -> String {
    format_number_u64(u64::try_from(value).unwrap_or(u64::MAX))
}

/// Shorten text to `max` characters for one-line display.
#[must_use]
pub fn truncate_text(text: &str, max: usize) -> String {
    let flat = text.replace(['\n', '\r'], " ");
    if flat.chars().count() <= max {
        return flat;
    }
    let kept: String = flat.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::{format_number_u64, format_number_usize, truncate_text};

    #[test]
    fn format_number_adds_separators() {
        assert_eq!(format_number_u64(0), "0");
        assert_eq!(format_number_u64(999), "999");
        assert_eq!(format_number_u64(1000), "1,000");
        assert_eq!(format_number_usize(12_345_678), "12,345,678");
    }

    #[test]
    fn truncate_text_flattens_and_shortens() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("line\nbreak", 20), "line break");
        assert_eq!(truncate_text("abcdefghijkl", 8), "abcde...");
    }
}
