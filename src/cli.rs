//! CLI definitions for xharvest.
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::model::SearchMode;

/// xharvest - adaptive X search harvester
#[derive(Parser, Debug)]
#[command(name = "xharvest")]
#[command(version)]
#[command(about = "Harvest X search results into run, daily and all-time datasets")]
#[command(long_about = r#"
xharvest crawls X search results, normalizes every post into a fixed
schema, and keeps three deduplicated JSON-lines datasets up to date:
one file per run, one per UTC day, and one all-time collection, plus an
append-only run log.

Pages are supplied by a document provider. The bundled provider replays
pages captured by a browser (see `xharvest run --help`).

Quick start:
  1. Capture search pages into a directory with an index.json
  2. Run: xharvest run --replay ./capture --keyword bitcoin
  3. Inspect: xharvest log && xharvest verify
"#)]
pub struct Cli {
    /// Root directory of the dataset store
    #[arg(long, env = "XH_STORE", global = true)]
    pub store: Option<PathBuf>,

    /// Configuration file (default: ~/.config/xharvest/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Be verbose (-v debug, -vv trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Be quiet (suppress non-error output)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl search passes and commit them as a run
    Run(RunArgs),

    /// Commit records from a JSON-lines file as a run
    Import(ImportArgs),

    /// Show the run log
    Log(LogArgs),

    /// Check the store for inconsistencies
    Verify,

    /// Show or manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Directory of captured pages with an index.json
    #[arg(long, short = 'r')]
    pub replay: PathBuf,

    /// Keyword to search (repeatable; overrides config)
    #[arg(long, short = 'k')]
    pub keyword: Vec<String>,

    /// Search mode (repeatable; overrides config)
    #[arg(long, short = 'm', value_parser = parse_mode)]
    pub mode: Vec<SearchMode>,

    /// Hard cap on cycles per pass
    #[arg(long)]
    pub max_cycles: Option<u32>,

    /// Consecutive cycles without new records before a pass stops
    #[arg(long)]
    pub threshold: Option<u32>,

    /// Skip reply harvesting
    #[arg(long)]
    pub no_comments: bool,

    /// Visit author profiles for follower counts
    #[arg(long)]
    pub profiles: bool,

    /// Keep the configured waits (replays skip them by default)
    #[arg(long)]
    pub paced: bool,

    /// Do not run the sync command
    #[arg(long)]
    pub no_sync: bool,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// JSON-lines file of records
    pub file: PathBuf,

    /// Do not run the sync command
    #[arg(long)]
    pub no_sync: bool,
}

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Number of most recent runs to show
    #[arg(long, short = 'n', default_value = "20")]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Show the effective configuration
    #[arg(long)]
    pub show: bool,

    /// Write a default config file (to --config or the user config path)
    #[arg(long)]
    pub init: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonPretty,
}

fn parse_mode(value: &str) -> Result<SearchMode, String> {
    value.parse()
}
