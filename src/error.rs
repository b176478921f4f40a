//! Custom error types for xharvest.
//!
//! Failures are grouped by how far they are allowed to travel:
//! node-level extraction problems never leave the crawl pass
//! ([`crate::normalize::SkipReason`]), enrichment problems stay inside the
//! cache ([`crate::enrich::FetchError`]) unless the provider is left on a
//! profile page, provider failures end a single pass, and persistence
//! failures abort the run.

use colored::Colorize;
use std::path::PathBuf;
use thiserror::Error;

use crate::provider::ProviderError;

/// Primary error type for xharvest operations.
#[derive(Error, Debug)]
pub enum HarvestError {
    // =========================================================================
    // Provider Errors
    // =========================================================================
    /// The document provider could not produce content for a pass.
    #[error("Pass '{pass}' failed: {source}")]
    PassFailed {
        pass: String,
        #[source]
        source: ProviderError,
    },

    // =========================================================================
    // Store Errors
    // =========================================================================
    /// Every run file name for this stamp is taken; run collections are
    /// write-once.
    #[error("Run file already exists at '{path}'")]
    RunExists { path: PathBuf },

    /// A persisted file could not be parsed.
    #[error("Failed to parse '{file}': {reason}")]
    ParseError { file: String, reason: String },

    /// Store root is missing when a read-only command needs it.
    #[error("No store found at '{path}'. Run 'xharvest run' or 'xharvest import' first.")]
    StoreNotFound { path: PathBuf },

    // =========================================================================
    // IO Errors
    // =========================================================================
    /// File read/write error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Path-specific IO error with context.
    #[error("Failed to {operation} '{path}': {source}")]
    PathError {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file parsing error.
    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigError { path: PathBuf, reason: String },

    /// Invalid command-line argument.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    // =========================================================================
    // Sync Errors
    // =========================================================================
    /// The sync gateway refused or failed to publish the store.
    #[error("Sync failed: {reason}")]
    Sync { reason: String },

    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// Catch-all for other errors with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Wrapped anyhow error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for xharvest operations.
pub type Result<T> = std::result::Result<T, HarvestError>;

impl HarvestError {
    /// Create a pass failure error.
    pub fn pass_failed(pass: impl Into<String>, source: ProviderError) -> Self {
        Self::PassFailed {
            pass: pass.into(),
            source,
        }
    }

    /// Create a parse error.
    pub fn parse_error(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ParseError {
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Create a store not found error.
    pub fn store_not_found(path: impl Into<PathBuf>) -> Self {
        Self::StoreNotFound { path: path.into() }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create a sync error.
    pub fn sync(reason: impl Into<String>) -> Self {
        Self::Sync {
            reason: reason.into(),
        }
    }

    /// Create a path error with context.
    pub fn path_error(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::PathError {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Wrap an error with additional context.
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Check if this error is recoverable (user can fix it).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::StoreNotFound { .. }
                | Self::InvalidArgument { .. }
                | Self::ConfigError { .. }
                | Self::PassFailed { .. }
                | Self::Sync { .. }
        )
    }

    /// Check if this error left the store untouched for the in-flight run.
    #[must_use]
    pub const fn is_persistence_failure(&self) -> bool {
        matches!(
            self,
            Self::PathError { .. } | Self::RunExists { .. } | Self::IoError(_)
        )
    }

    /// Get a suggestion for how to fix this error, if applicable.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::StoreNotFound { .. } => {
                Some("Pass --store <dir> or set XH_STORE to point at an existing store.")
            }
            Self::RunExists { .. } => {
                Some("Too many runs share this second; wait a moment and retry.")
            }
            Self::ParseError { .. } => {
                Some("Run 'xharvest verify' to locate the damaged file.")
            }
            Self::ConfigError { .. } => {
                Some("Run 'xharvest config --init' to regenerate a default config file.")
            }
            Self::PathError { .. } => Some("Check free disk space and directory permissions."),
            Self::Sync { .. } => {
                Some("The local store is intact; re-run the sync command manually.")
            }
            _ => None,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error.
    ///
    /// # Errors
    ///
    /// Returns the original error wrapped with additional context.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily (only evaluated on error).
    ///
    /// # Errors
    ///
    /// Returns the original error wrapped with additional context.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| HarvestError::with_context(context, e))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| HarvestError::with_context(f(), e))
    }
}

/// Render an error block for the terminal: a headline, an optional detail
/// paragraph and one `hint:` line per suggestion.
#[must_use]
pub fn format_error(title: &str, explanation: &str, suggestions: &[&str]) -> String {
    let mut lines = vec![format!("{} {}", "error:".red().bold(), title.bold())];
    if !explanation.is_empty() && explanation != title {
        lines.push(format!("  {}", explanation.dimmed()));
    }
    lines.extend(
        suggestions
            .iter()
            .map(|s| format!("  {} {s}", "hint:".cyan())),
    );
    lines.join("\n")
}

/// Render a [`HarvestError`] with its source as detail and its hint.
#[must_use]
pub fn format_harvest_error(err: &HarvestError) -> String {
    let explanation = std::error::Error::source(err)
        .map(ToString::to_string)
        .unwrap_or_default();
    let suggestions: Vec<&str> = err.suggestion().into_iter().collect();
    format_error(&err.to_string(), &explanation, &suggestions)
}
