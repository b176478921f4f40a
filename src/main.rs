//! xharvest - adaptive X search harvester CLI
//!
//! Main entry point for the xharvest command-line tool.

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use xharvest::config::Config;
use xharvest::crawl::{CrawlController, CrawlSettings};
use xharvest::doctor::{self, CheckStatus, DoctorReport};
use xharvest::enrich::{EnrichmentCache, PageProfileFetcher, RetryPolicy};
use xharvest::logging::{OperationGuard, init_cli_logging};
use xharvest::store::read_jsonl_strict;
use xharvest::sync::{CommandGateway, SyncGateway, SyncStatus};
use xharvest::*;

fn main() {
    let cli = Cli::parse();
    init_cli_logging(cli.quiet, cli.verbose);

    if let Err(err) = dispatch(&cli) {
        let code = match err.downcast_ref::<HarvestError>() {
            Some(harvest_err) => {
                eprintln!("{}", format_harvest_error(harvest_err));
                if harvest_err.is_persistence_failure() {
                    warn!("Run aborted while writing the store; files already replaced are complete");
                }
                if harvest_err.is_recoverable() { 2 } else { 1 }
            }
            None => {
                eprintln!("{}", format_error(&format!("{err:#}"), "", &[]));
                1
            }
        };
        std::process::exit(code);
    }
}

fn dispatch(cli: &Cli) -> Result<()> {
    // The file --init creates must not be required to exist beforehand.
    if matches!(&cli.command, Commands::Config(args) if args.init) {
        return cmd_config_init(cli);
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(store) = &cli.store {
        config.paths.store = Some(store.clone());
    }
    debug!(store = %config.store_path().display(), "Using store");

    match &cli.command {
        Commands::Run(args) => cmd_run(cli, config, args),
        Commands::Import(args) => cmd_import(cli, &config, args),
        Commands::Log(args) => cmd_log(cli, &config, args),
        Commands::Verify => cmd_verify(cli, &config),
        Commands::Config(args) => cmd_config(cli, &config, args),
        Commands::Completions(args) => {
            cmd_completions(args.shell);
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(format: OutputFormat, value: &T) -> Result<()> {
    let out = if format == OutputFormat::JsonPretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}

fn gateway(config: &Config, disabled: bool) -> Option<Box<dyn SyncGateway>> {
    if disabled {
        return None;
    }
    CommandGateway::new(config.sync.command.clone())
        .map(|g| Box::new(g) as Box<dyn SyncGateway>)
}

fn harvester(config: &Config, settings: CrawlSettings, no_sync: bool) -> Harvester {
    let store = AggregationStore::new(config.store_path()).with_latest(config.store.write_latest);
    Harvester::new(CrawlController::new(settings, config.normalizer()), store)
        .sort_by_engagement(config.store.sort_by_engagement)
        .with_gateway(gateway(config, no_sync))
}

fn spinner(cli: &Cli, message: &str) -> ProgressBar {
    if cli.quiet || cli.format != OutputFormat::Text {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed}] {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn cmd_run(cli: &Cli, mut config: Config, args: &RunArgs) -> Result<()> {
    if !args.keyword.is_empty() {
        config.crawl.keywords.clone_from(&args.keyword);
    }
    if !args.mode.is_empty() {
        config.crawl.modes.clone_from(&args.mode);
    }
    if let Some(n) = args.max_cycles {
        config.crawl.max_cycles = n;
    }
    if let Some(n) = args.threshold {
        config.crawl.no_new_threshold = n;
    }
    if args.no_comments {
        config.comments.enabled = false;
    }
    if args.profiles {
        config.enrichment.enabled = true;
    }

    let plan = config.plan()?;
    let mut settings = config.crawl_settings();
    let mut policy = config.retry_policy();
    let mut profile_settle = Duration::from_millis(config.enrichment.settle_ms);
    if !args.paced {
        settings = settings.without_delays();
        policy = RetryPolicy::immediate(policy.max_retries);
        profile_settle = Duration::ZERO;
    }

    let mut provider = ReplayProvider::open(&args.replay)
        .with_context(|| format!("Cannot use capture {}", args.replay.display()))?;
    debug!(locators = ?provider.locators(), "Replay capture ready");
    let mut cache = if config.enrichment.enabled {
        EnrichmentCache::with_policy(Box::new(PageProfileFetcher::new(profile_settle)), policy)
    } else {
        EnrichmentCache::disabled()
    };

    let harvester = harvester(&config, settings, args.no_sync);
    let ctx = RunContext::now();

    let pb = spinner(
        cli,
        &format!(
            "Crawling {} keyword(s) x {} mode(s)...",
            plan.keywords.len(),
            plan.modes.len()
        ),
    );
    let guard = OperationGuard::new(format!("run {}", ctx.stamp));
    let result = harvester.run(&mut provider, &mut cache, &plan, &ctx);
    pb.finish_and_clear();

    let report = match result {
        Ok(report) => {
            guard.complete();
            report
        }
        Err(e) => {
            guard.fail(&e);
            return Err(e.into());
        }
    };

    if cli.format == OutputFormat::Text {
        print_run_report(&report, harvester.store());
        Ok(())
    } else {
        print_json(cli.format, &report)
    }
}

fn cmd_import(cli: &Cli, config: &Config, args: &ImportArgs) -> Result<()> {
    let mut records: Vec<Record> = read_jsonl_strict(&args.file)?;
    for record in &mut records {
        let comments = std::mem::take(&mut record.comments);
        record.set_comments(comments);
    }

    let harvester = harvester(config, config.crawl_settings(), args.no_sync);
    let report = harvester.commit(&RunContext::now(), records)?;

    if cli.format == OutputFormat::Text {
        print_run_report(&report, harvester.store());
        Ok(())
    } else {
        print_json(cli.format, &report)
    }
}

fn print_run_report(report: &RunReport, store: &AggregationStore) {
    let s = &report.summary;
    println!(
        "{} Run {} committed",
        "✓".green(),
        s.stamp.bold()
    );
    println!("  Store: {}", store.root().display());

    if !report.passes.is_empty() {
        println!();
        println!(
            "  {} ({} failed)",
            "Passes".bold(),
            report.failed_passes()
        );
        for pass in &report.passes {
            let label = format!("{}/{}", pass.keyword, pass.mode);
            match &pass.error {
                Some(error) => println!(
                    "    {} {label:<24} {}",
                    "✗".red(),
                    truncate_text(error, 72).dimmed()
                ),
                None => println!(
                    "    {} {label:<24} {:>6} records {:>4} cycles  stop: {}",
                    "✓".green(),
                    format_number_usize(pass.records),
                    pass.cycles,
                    pass.stop.as_deref().unwrap_or("-")
                ),
            }
        }
        if report.cross_pass_duplicates > 0 {
            println!(
                "    {} duplicate(s) across passes dropped",
                report.cross_pass_duplicates
            );
        }
    }

    println!();
    println!("  {:<8} {:>8} rows  {}", "Run", format_number_usize(s.run_rows).cyan(), s.run_file);
    println!("  {:<8} {:>8} rows  {}", "Daily", format_number_usize(s.daily_rows).cyan(), s.daily_file);
    println!("  {:<8} {:>8} rows  {}", "All", format_number_usize(s.all_rows).cyan(), s.all_file);

    if report.enrichment.misses > 0 {
        println!(
            "  Profiles: {} fetched, {} cached, {} degraded",
            report.enrichment.misses, report.enrichment.hits, report.enrichment.failures
        );
    }

    match &report.sync {
        SyncStatus::Skipped => println!("  Sync: {}", "skipped".dimmed()),
        SyncStatus::Published { message } => println!("  Sync: {} ({message})", "published".green()),
        SyncStatus::Failed { reason, .. } => {
            warn!(reason = %reason, "Sync failed");
            println!("  Sync: {} ({reason})", "failed".red());
        }
    }
}

fn cmd_log(cli: &Cli, config: &Config, args: &LogArgs) -> Result<()> {
    let store = AggregationStore::open_existing(config.store_path())?;
    let log = store.read_log()?;
    let start = log.len().saturating_sub(args.limit);
    let recent = &log[start..];

    if cli.format != OutputFormat::Text {
        return print_json(cli.format, &recent);
    }

    if recent.is_empty() {
        println!("No runs logged yet.");
        return Ok(());
    }

    println!(
        "{:<12} {:<18} {:>8} {:>8} {:>10}  {}",
        "Day".bold(),
        "Stamp".bold(),
        "Run".bold(),
        "Daily".bold(),
        "All".bold(),
        "File".bold()
    );
    println!("{}", "─".repeat(CONTENT_DIVIDER_WIDTH).dimmed());
    for entry in recent {
        println!(
            "{:<12} {:<18} {:>8} {:>8} {:>10}  {}",
            entry.day,
            entry.run_stamp_utc,
            format_number_usize(entry.run_rows),
            format_number_usize(entry.daily_rows),
            format_number_usize(entry.all_rows),
            entry.run_file.dimmed()
        );
    }
    if start > 0 {
        println!("{}", format!("({start} older run(s) not shown)").dimmed());
    }
    Ok(())
}

fn cmd_verify(cli: &Cli, config: &Config) -> Result<()> {
    let store = AggregationStore::open_existing(config.store_path())?;
    let report = doctor::run_checks(&store)?;

    if cli.format == OutputFormat::Text {
        print_doctor_report(&report);
    } else {
        print_json(cli.format, &report)?;
    }

    if report.has_errors() {
        anyhow::bail!("{} check(s) failed", report.errors);
    }
    Ok(())
}

fn print_doctor_report(report: &DoctorReport) {
    println!("{} {}", "Store:".bold(), report.store.display());
    println!();
    for check in &report.checks {
        let icon = match check.status {
            CheckStatus::Pass => "✓".green(),
            CheckStatus::Warning => "!".yellow(),
            CheckStatus::Error => "✗".red(),
        };
        println!("  {icon} {:<32} {}", check.name, check.message);
        if let Some(suggestion) = &check.suggestion {
            if !check.status.is_ok() {
                println!("      {} {suggestion}", "Hint:".cyan());
            }
        }
    }
    println!();
    println!(
        "  {} passed, {} warning(s), {} error(s) in {} ms",
        report.passed.to_string().green(),
        report.warnings.to_string().yellow(),
        report.errors.to_string().red(),
        report.elapsed_ms
    );
}

fn cmd_config_init(cli: &Cli) -> Result<()> {
    let target: Option<PathBuf> = cli.config.clone();
    let destination = target.clone().or_else(Config::user_config_path);
    if let Some(path) = destination.filter(|p| p.exists()) {
        anyhow::bail!("Config file already exists at {}", path.display());
    }
    let written = Config::default()
        .save(target.as_deref())
        .context("Cannot write config file")?;
    if !cli.quiet {
        println!("{} Wrote {}", "✓".green(), written.display());
    }
    Ok(())
}

fn cmd_config(cli: &Cli, config: &Config, args: &ConfigArgs) -> Result<()> {
    if cli.format == OutputFormat::Text {
        print!("{}", toml::to_string_pretty(config)?);
        if !args.show {
            println!();
            println!("# store root: {}", config.store_path().display());
        }
        Ok(())
    } else {
        print_json(cli.format, config)
    }
}

fn cmd_completions(shell: clap_complete::Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "xharvest", &mut io::stdout());
}
