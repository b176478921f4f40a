//! Configuration system for xharvest.
//!
//! Provides layered configuration from multiple sources:
//!
//! 1. **Compiled defaults** - Sensible defaults built into the binary
//! 2. **User config file** - `~/.config/xharvest/config.toml`
//! 3. **Environment variables** - `XH_*` prefix
//! 4. **CLI arguments** - Highest priority, always wins
//!
//! # Example Configuration File
//!
//! ```toml
//! [paths]
//! store = "~/.local/share/xharvest/data"
//!
//! [crawl]
//! keywords = ["bitcoin"]
//! modes = ["default", "live"]
//! max_cycles = 60
//! no_new_threshold = 5
//!
//! [comments]
//! enabled = true
//! max_per_record = 5
//!
//! [enrichment]
//! enabled = false
//!
//! [sync]
//! command = ["hf", "upload", "me/tweets", "{root}", "--commit-message", "{message}"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::crawl::{CommentSettings, CrawlSettings, Pacer};
use crate::enrich::RetryPolicy;
use crate::error::{HarvestError, Result};
use crate::model::SearchMode;
use crate::normalize::RecordNormalizer;
use crate::pipeline::HarvestPlan;

/// Main configuration structure for xharvest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path-related configuration.
    pub paths: PathsConfig,
    /// Search crawl behavior.
    pub crawl: CrawlConfig,
    /// Reply harvesting.
    pub comments: CommentsConfig,
    /// Author profile enrichment.
    pub enrichment: EnrichmentConfig,
    /// Store behavior.
    pub store: StoreConfig,
    /// Post-run publishing.
    pub sync: SyncConfig,
}

/// Path configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the aggregation store.
    /// Environment variable: `XH_STORE`
    pub store: Option<PathBuf>,
}

/// Search crawl configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Search terms. Environment variable: `XH_KEYWORDS` (comma separated).
    pub keywords: Vec<String>,
    /// Search tabs. Environment variable: `XH_MODES` (comma separated).
    pub modes: Vec<SearchMode>,
    /// Hard cap on cycles per pass. Environment variable: `XH_SCROLLS`.
    pub max_cycles: u32,
    /// Consecutive empty cycles before a pass stops.
    /// Environment variable: `XH_NO_NEW_THRESHOLD`.
    pub no_new_threshold: u32,
    /// Wait after opening a search page.
    pub settle_ms: u64,
    pub cycle_delay_min_ms: u64,
    pub cycle_delay_max_ms: u64,
    pub record_delay_min_ms: u64,
    pub record_delay_max_ms: u64,
    /// Shortest post text kept.
    pub min_text_chars: usize,
}

/// Reply harvesting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentsConfig {
    /// Environment variable: `XH_ENABLE_COMMENTS`.
    pub enabled: bool,
    pub max_per_record: usize,
    /// Viewport advances on a post's detail page.
    pub scrolls: u32,
    pub min_text_chars: usize,
    pub settle_ms: u64,
}

/// Profile enrichment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Visit author profiles for follower counts (slow, rate limited).
    /// Environment variable: `XH_ENABLE_PROFILES`.
    pub enabled: bool,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub settle_ms: u64,
}

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Order each run by likes, reposts, replies, views.
    pub sort_by_engagement: bool,
    /// Rewrite `latest.jsonl` on every run.
    pub write_latest: bool,
}

/// Sync gateway configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Command run after each commit; `{root}` and `{message}` are
    /// substituted. Empty disables sync.
    /// Environment variable: `XH_SYNC_COMMAND` (whitespace separated).
    pub command: Vec<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            keywords: vec!["bitcoin".to_string()],
            modes: SearchMode::all(),
            max_cycles: 60,
            no_new_threshold: 5,
            settle_ms: 6_000,
            cycle_delay_min_ms: 2_000,
            cycle_delay_max_ms: 3_200,
            record_delay_min_ms: 400,
            record_delay_max_ms: 900,
            min_text_chars: 8,
        }
    }
}

impl Default for CommentsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_per_record: 5,
            scrolls: 3,
            min_text_chars: 3,
            settle_ms: 3_000,
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: 2,
            backoff_ms: 1_500,
            settle_ms: 2_000,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sort_by_engagement: true,
            write_latest: true,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. `explicit` file if given, else the user config file
    /// 3. Compiled defaults
    ///
    /// # Errors
    /// Returns an error if an explicitly named file cannot be read or parsed.
    /// A broken user config file is only warned about.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        match explicit {
            Some(path) => config.merge(Self::load_explicit(path)?),
            None => {
                if let Some(user_config) = Self::load_user_config() {
                    config.merge(user_config);
                }
            }
        }

        config.apply_env_overrides();

        debug!("Configuration loaded: {:?}", config);
        Ok(config)
    }

    /// Load configuration from a specific file, warning on failure.
    #[must_use]
    pub fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            debug!("Config file not found: {}", path.display());
            return None;
        }

        match Self::load_explicit(path) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("{e}");
                None
            }
        }
    }

    /// Load a file the user asked for by name.
    ///
    /// # Errors
    /// Returns [`HarvestError::ConfigError`] if it is missing or invalid.
    pub fn load_explicit(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| HarvestError::ConfigError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config = toml::from_str(&content).map_err(|e| HarvestError::ConfigError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    /// Load the user configuration file from the standard location.
    fn load_user_config() -> Option<Self> {
        let config_path = Self::user_config_path()?;
        Self::load_from_file(&config_path)
    }

    /// Get the path to the user configuration file.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("xharvest").join("config.toml"))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `XH_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(store) = lookup("XH_STORE") {
            self.paths.store = Some(PathBuf::from(store));
        }

        if let Some(keywords) = lookup("XH_KEYWORDS") {
            let keywords = split_list(&keywords);
            if !keywords.is_empty() {
                self.crawl.keywords = keywords;
            }
        }
        if let Some(modes) = lookup("XH_MODES") {
            let parsed: std::result::Result<Vec<SearchMode>, _> =
                split_list(&modes).iter().map(|m| m.parse()).collect();
            match parsed {
                Ok(modes) if !modes.is_empty() => self.crawl.modes = modes,
                Ok(_) => {}
                Err(e) => warn!("Ignoring XH_MODES: {e}"),
            }
        }
        if let Some(n) = lookup("XH_SCROLLS").and_then(|v| v.trim().parse().ok()) {
            self.crawl.max_cycles = n;
        }
        if let Some(n) = lookup("XH_NO_NEW_THRESHOLD").and_then(|v| v.trim().parse().ok()) {
            self.crawl.no_new_threshold = n;
        }

        if let Some(flag) = lookup("XH_ENABLE_COMMENTS") {
            self.comments.enabled = parse_flag(&flag);
        }
        if let Some(flag) = lookup("XH_ENABLE_PROFILES") {
            self.enrichment.enabled = parse_flag(&flag);
        }

        if let Some(command) = lookup("XH_SYNC_COMMAND") {
            self.sync.command = command.split_whitespace().map(String::from).collect();
        }
    }

    /// Merge another config into this one (other takes precedence).
    fn merge(&mut self, other: Self) {
        if other.paths.store.is_some() {
            self.paths.store = other.paths.store;
        }
        self.crawl = other.crawl;
        self.comments = other.comments;
        self.enrichment = other.enrichment;
        self.store = other.store;
        if !other.sync.command.is_empty() {
            self.sync.command = other.sync.command;
        }
    }

    /// Get the store root, using defaults if not configured.
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.paths
            .store
            .clone()
            .unwrap_or_else(crate::default_store_dir)
    }

    /// Crawl tuning derived from the `[crawl]` and `[comments]` sections.
    #[must_use]
    pub const fn crawl_settings(&self) -> CrawlSettings {
        CrawlSettings {
            max_cycles: self.crawl.max_cycles,
            no_new_threshold: self.crawl.no_new_threshold,
            settle: Duration::from_millis(self.crawl.settle_ms),
            cycle_delay: Pacer::new(self.crawl.cycle_delay_min_ms, self.crawl.cycle_delay_max_ms),
            record_delay: Pacer::new(
                self.crawl.record_delay_min_ms,
                self.crawl.record_delay_max_ms,
            ),
            comments: CommentSettings {
                enabled: self.comments.enabled,
                max_per_record: self.comments.max_per_record,
                scrolls: self.comments.scrolls,
                settle: Duration::from_millis(self.comments.settle_ms),
            },
        }
    }

    #[must_use]
    pub const fn normalizer(&self) -> RecordNormalizer {
        RecordNormalizer::new(self.crawl.min_text_chars, self.comments.min_text_chars)
    }

    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.enrichment.max_retries,
            backoff_ms: self.enrichment.backoff_ms,
        }
    }

    /// Keywords × modes to crawl.
    ///
    /// # Errors
    /// Returns an error when there is nothing to crawl.
    pub fn plan(&self) -> Result<HarvestPlan> {
        let keywords: Vec<String> = self
            .crawl
            .keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keywords.is_empty() {
            return Err(HarvestError::invalid_argument("no keywords configured"));
        }
        if self.crawl.modes.is_empty() {
            return Err(HarvestError::invalid_argument("no search modes configured"));
        }
        Ok(HarvestPlan {
            keywords,
            modes: self.crawl.modes.clone(),
        })
    }

    /// Save the current configuration to `path`, or the user config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined,
    /// the parent directory cannot be created, or the file cannot be written.
    pub fn save(&self, path: Option<&Path>) -> std::io::Result<PathBuf> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::user_config_path().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Could not determine config directory",
                )
            })?,
        };

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        std::fs::write(&config_path, content)?;
        info!("Saved config to: {}", config_path.display());
        Ok(config_path)
    }

    /// Generate a default configuration file content.
    #[must_use]
    pub fn default_config_content() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}
