//! Diagnostics setup for xharvest.
//!
//! Everything is written to stderr through `tracing`, which keeps stdout
//! free for `--format json`. `RUST_LOG`, when set, replaces the filter
//! derived from `-q` / `-v`.
//!
//! ```rust
//! use xharvest::logging::{LogConfig, Verbosity, init_logging};
//!
//! init_logging(&LogConfig::new(Verbosity::Normal));
//! tracing::info!(keyword = "bitcoin", "Starting pass");
//! ```

use std::time::Instant;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// How much the harvester reports about itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// Errors only (`-q`).
    Quiet,
    /// Pass and run milestones, skipped passes, degraded enrichment.
    #[default]
    Normal,
    /// Per-cycle crawl detail (`-v`).
    Debug,
    /// Everything, with source locations (`-vv`).
    Trace,
}

impl Verbosity {
    /// `-q` wins over any number of `-v`.
    #[must_use]
    pub const fn from_flags(quiet: bool, verbose: u8) -> Self {
        if quiet {
            return Self::Quiet;
        }
        match verbose {
            0 => Self::Normal,
            1 => Self::Debug,
            _ => Self::Trace,
        }
    }

    const fn level(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// Filter directive limited to this crate, so dependency chatter
    /// (html5ever, selectors) stays out of the output.
    #[must_use]
    pub fn directive(self) -> String {
        format!("xharvest={}", self.level())
    }
}

/// Subscriber settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogConfig {
    pub verbosity: Verbosity,
    /// ANSI colors in log lines.
    pub ansi: bool,
    /// Wall-clock time on each line. Off for `-q`, where only errors print.
    pub timestamps: bool,
}

impl LogConfig {
    #[must_use]
    pub const fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            ansi: true,
            timestamps: !matches!(verbosity, Verbosity::Quiet),
        }
    }

    /// Settings for the CLI flags. `no_color` mirrors the `NO_COLOR`
    /// convention.
    #[must_use]
    pub const fn for_cli(quiet: bool, verbose: u8, no_color: bool) -> Self {
        let mut config = Self::new(Verbosity::from_flags(quiet, verbose));
        config.ansi = !no_color;
        config
    }

    fn filter(&self) -> EnvFilter {
        if std::env::var_os("RUST_LOG").is_some() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(self.verbosity.directive())
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new(Verbosity::Normal)
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_logging(config: &LogConfig) {
    let detailed = config.verbosity == Verbosity::Trace;
    let layer = fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_ansi(config.ansi)
        .with_target(detailed)
        .with_file(detailed)
        .with_line_number(detailed);

    // A subscriber set by an embedding program or a test harness wins.
    let registry = tracing_subscriber::registry().with(config.filter());
    if config.timestamps {
        registry.with(layer).try_init().ok();
    } else {
        registry.with(layer.without_time()).try_init().ok();
    }
}

/// Install the subscriber for the `xharvest` binary.
pub fn init_cli_logging(quiet: bool, verbose: u8) {
    let no_color = std::env::var_os("NO_COLOR").is_some();
    init_logging(&LogConfig::for_cli(quiet, verbose, no_color));
}

/// Logs how long a named operation took and how it ended.
#[derive(Debug)]
pub struct OperationGuard {
    name: String,
    started: Instant,
}

impl OperationGuard {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        tracing::info!(operation = %name, "Started");
        Self {
            name,
            started: Instant::now(),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    pub fn complete(self) {
        tracing::info!(operation = %self.name, elapsed_ms = self.elapsed_ms(), "Finished");
    }

    pub fn fail(self, error: &dyn std::error::Error) {
        tracing::error!(
            operation = %self.name,
            elapsed_ms = self.elapsed_ms(),
            %error,
            "Aborted"
        );
    }
}
