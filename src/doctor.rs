//! Health checks for `xharvest verify`.
//!
//! Each check inspects the on-disk store and reports whether the run, daily
//! and all-time collections and the run log still agree with each other.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::fingerprint::duplicate_count;
use crate::model::Record;
use crate::store::{AggregationStore, LoadedRecords};

/// High-level category for a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCategory {
    Collections,
    Dedup,
    Comments,
    RunLog,
}

/// Status for an individual health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warning,
    Error,
}

impl CheckStatus {
    /// Whether the check is healthy enough for continued operation.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Single health check result.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub category: CheckCategory,
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl HealthCheck {
    fn pass(category: CheckCategory, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category,
            name: name.into(),
            status: CheckStatus::Pass,
            message: message.into(),
            suggestion: None,
        }
    }

    fn problem(
        category: CheckCategory,
        status: CheckStatus,
        name: impl Into<String>,
        message: impl Into<String>,
        suggestion: &str,
    ) -> Self {
        Self {
            category,
            name: name.into(),
            status,
            message: message.into(),
            suggestion: Some(suggestion.to_string()),
        }
    }
}

/// All checks plus totals.
#[derive(Debug, Clone, Serialize)]
pub struct DoctorReport {
    pub store: PathBuf,
    pub checks: Vec<HealthCheck>,
    pub passed: usize,
    pub warnings: usize,
    pub errors: usize,
    pub elapsed_ms: u128,
}

impl DoctorReport {
    #[must_use]
    pub const fn has_errors(&self) -> bool {
        self.errors > 0
    }
}

/// A collection file loaded once and shared by several checks.
struct Collection {
    label: String,
    loaded: LoadedRecords,
}

fn relative_label(store: &AggregationStore, path: &Path) -> String {
    path.strip_prefix(store.root())
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn load_collections(store: &AggregationStore) -> Result<Vec<Collection>> {
    let mut paths = vec![store.all_path(), store.latest_path()];
    paths.extend(store.daily_files()?);

    let mut collections = Vec::with_capacity(paths.len());
    for path in paths {
        if !path.exists() {
            continue;
        }
        collections.push(Collection {
            label: relative_label(store, &path),
            loaded: store.load_records(&path)?,
        });
    }
    Ok(collections)
}

/// Check that every collection line decodes.
fn check_parse(collections: &[Collection]) -> Vec<HealthCheck> {
    collections
        .iter()
        .map(|c| {
            let name = format!("Parse: {}", c.label);
            if c.loaded.malformed.is_empty() {
                HealthCheck::pass(
                    CheckCategory::Collections,
                    name,
                    format!("{} records", c.loaded.records.len()),
                )
            } else {
                let lines: Vec<String> = c
                    .loaded
                    .malformed
                    .iter()
                    .take(5)
                    .map(|m| m.line.to_string())
                    .collect();
                HealthCheck::problem(
                    CheckCategory::Collections,
                    CheckStatus::Warning,
                    name,
                    format!(
                        "{} malformed line(s) (lines {}); they are dropped on the next merge",
                        c.loaded.malformed.len(),
                        lines.join(", ")
                    ),
                    "Inspect or restore the file from the run files before the next run",
                )
            }
        })
        .collect()
}

/// Check that cumulative collections hold no fingerprint twice.
///
/// `latest.jsonl` is excluded: it is a copy of one run file.
fn check_duplicates(collections: &[Collection]) -> Vec<HealthCheck> {
    collections
        .iter()
        .filter(|c| c.label != crate::store::LATEST_FILE)
        .map(|c| {
            let name = format!("Unique: {}", c.label);
            match duplicate_count(&c.loaded.records) {
                0 => HealthCheck::pass(CheckCategory::Dedup, name, "No duplicate fingerprints"),
                n => HealthCheck::problem(
                    CheckCategory::Dedup,
                    CheckStatus::Error,
                    name,
                    format!("{n} record(s) share a fingerprint with an earlier record"),
                    "The file was edited outside xharvest; re-import it to dedupe",
                ),
            }
        })
        .collect()
}

/// Check `comments_count == len(comments)` everywhere.
fn check_comments(collections: &[Collection]) -> Vec<HealthCheck> {
    let inconsistent: usize = collections
        .iter()
        .map(|c| {
            c.loaded
                .records
                .iter()
                .filter(|r| !Record::comments_consistent(r))
                .count()
        })
        .sum();

    let check = if inconsistent == 0 {
        HealthCheck::pass(
            CheckCategory::Comments,
            "Comment counts",
            "comments_count matches comments everywhere",
        )
    } else {
        HealthCheck::problem(
            CheckCategory::Comments,
            CheckStatus::Error,
            "Comment counts",
            format!("{inconsistent} record(s) have comments_count != len(comments)"),
            "The file was edited outside xharvest",
        )
    };
    vec![check]
}

/// Check the run log against the run files and `all.jsonl`.
fn check_run_log(store: &AggregationStore, all_rows: Option<usize>) -> Vec<HealthCheck> {
    let log = match store.read_log() {
        Ok(log) => log,
        Err(e) => {
            return vec![HealthCheck::problem(
                CheckCategory::RunLog,
                CheckStatus::Error,
                "Run log",
                e.to_string(),
                "Repair meta/runs_log.jsonl; new runs cannot be logged until it parses",
            )];
        }
    };

    let mut checks = vec![HealthCheck::pass(
        CheckCategory::RunLog,
        "Run log",
        format!("{} run(s) logged", log.len()),
    )];

    let mut logged = HashSet::new();
    let mut mismatched = Vec::new();
    for entry in &log {
        logged.insert(entry.run_file.clone());
        let path = store.resolve(&entry.run_file);
        if !path.exists() {
            mismatched.push(format!("{} (missing)", entry.run_file));
            continue;
        }
        match store.load_records(&path) {
            Ok(loaded) if loaded.records.len() + loaded.malformed.len() == entry.run_rows => {}
            Ok(loaded) => mismatched.push(format!(
                "{} ({} rows, log says {})",
                entry.run_file,
                loaded.records.len(),
                entry.run_rows
            )),
            Err(e) => mismatched.push(format!("{} ({e})", entry.run_file)),
        }
    }

    checks.push(if mismatched.is_empty() {
        HealthCheck::pass(
            CheckCategory::RunLog,
            "Run files",
            "Every logged run file exists with the logged row count",
        )
    } else {
        HealthCheck::problem(
            CheckCategory::RunLog,
            CheckStatus::Error,
            "Run files",
            mismatched.join("; "),
            "Restore the run files from your synced copy",
        )
    });

    let orphans: Vec<String> = store
        .run_files()
        .into_iter()
        .filter(|f| !logged.contains(f))
        .collect();
    if !orphans.is_empty() {
        checks.push(HealthCheck::problem(
            CheckCategory::RunLog,
            CheckStatus::Warning,
            "Unlogged runs",
            format!("{} run file(s) not in the log: {}", orphans.len(), orphans.join(", ")),
            "A run was interrupted after writing its run file",
        ));
    }

    if let Some(last) = log.last() {
        let actual = all_rows.unwrap_or(0);
        checks.push(if last.all_rows == actual {
            HealthCheck::pass(
                CheckCategory::RunLog,
                "All-time total",
                format!("all.jsonl has {actual} rows, as logged"),
            )
        } else {
            HealthCheck::problem(
                CheckCategory::RunLog,
                CheckStatus::Error,
                "All-time total",
                format!(
                    "all.jsonl has {actual} rows but the last run logged {}",
                    last.all_rows
                ),
                "all.jsonl changed after the last logged run",
            )
        });
    }

    checks
}

/// Run every check against `store`.
///
/// # Errors
/// Returns an error only if the store cannot be listed or read at all.
pub fn run_checks(store: &AggregationStore) -> Result<DoctorReport> {
    let start = Instant::now();
    info!(store = %store.root().display(), "Verifying store");

    let collections = load_collections(store)?;
    let all_rows = collections
        .iter()
        .find(|c| c.label == crate::store::ALL_FILE)
        .map(|c| c.loaded.records.len() + c.loaded.malformed.len());

    let mut checks = check_parse(&collections);
    checks.extend(check_duplicates(&collections));
    checks.extend(check_comments(&collections));
    checks.extend(check_run_log(store, all_rows));

    let count = |status| checks.iter().filter(|c| c.status == status).count();
    let report = DoctorReport {
        store: store.root().to_path_buf(),
        passed: count(CheckStatus::Pass),
        warnings: count(CheckStatus::Warning),
        errors: count(CheckStatus::Error),
        elapsed_ms: start.elapsed().as_millis(),
        checks,
    };
    debug!(
        passed = report.passed,
        warnings = report.warnings,
        errors = report.errors,
        "Store verification finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Comment;
    use crate::store::RunContext;
    use chrono::{TimeZone, Utc};
    use std::fs;
    use tempfile::TempDir;

    fn ctx(hour: u32) -> RunContext {
        RunContext::at(Utc.with_ymd_and_hms(2025, 2, 2, hour, 0, 0).unwrap())
    }

    fn record(text: &str) -> Record {
        Record {
            text: text.to_string(),
            timestamp: Some("2025-02-02T00:00:00Z".to_string()),
            ..Record::default()
        }
    }

    fn statuses(report: &DoctorReport, name: &str) -> Vec<CheckStatus> {
        report
            .checks
            .iter()
            .filter(|c| c.name.starts_with(name))
            .map(|c| c.status)
            .collect()
    }

    #[test]
    fn healthy_store_passes() {
        let dir = TempDir::new().unwrap();
        let store = AggregationStore::new(dir.path());
        store.commit(&ctx(1), &[record("first post")]).unwrap();
        store.commit(&ctx(2), &[record("first post"), record("second post")]).unwrap();

        let report = run_checks(&store).unwrap();
        assert!(!report.has_errors(), "{:#?}", report.checks);
        assert_eq!(report.warnings, 0);
    }

    #[test]
    fn empty_store_has_nothing_to_flag() {
        let dir = TempDir::new().unwrap();
        let report = run_checks(&AggregationStore::new(dir.path())).unwrap();
        assert!(!report.has_errors());
    }

    #[test]
    fn duplicate_rows_are_errors() {
        let dir = TempDir::new().unwrap();
        let store = AggregationStore::new(dir.path());
        store.commit(&ctx(1), &[record("first post")]).unwrap();
        let line = serde_json::to_string(&record("first post")).unwrap();
        fs::write(store.all_path(), format!("{line}\n{line}\n")).unwrap();

        let report = run_checks(&store).unwrap();
        assert_eq!(statuses(&report, "Unique: all.jsonl"), vec![CheckStatus::Error]);
        assert_eq!(statuses(&report, "All-time total"), vec![CheckStatus::Error]);
    }

    #[test]
    fn inconsistent_comment_count_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = AggregationStore::new(dir.path());
        let mut bad = record("with comments");
        bad.comments = vec![Comment::default()];
        bad.comments_count = 3;
        store.commit(&ctx(1), &[bad]).unwrap();

        let report = run_checks(&store).unwrap();
        assert_eq!(statuses(&report, "Comment counts"), vec![CheckStatus::Error]);
    }

    #[test]
    fn missing_run_file_and_orphans_are_reported() {
        let dir = TempDir::new().unwrap();
        let store = AggregationStore::new(dir.path());
        store.commit(&ctx(1), &[record("first post")]).unwrap();
        fs::remove_file(store.resolve(&ctx(1).run_file())).unwrap();
        store.write_run(&ctx(5), &[record("orphaned")]).unwrap();

        let report = run_checks(&store).unwrap();
        assert_eq!(statuses(&report, "Run files"), vec![CheckStatus::Error]);
        assert_eq!(statuses(&report, "Unlogged runs"), vec![CheckStatus::Warning]);
    }

    #[test]
    fn broken_log_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = AggregationStore::new(dir.path());
        fs::create_dir_all(dir.path().join("meta")).unwrap();
        fs::write(store.log_path(), "nope\n").unwrap();

        let report = run_checks(&store).unwrap();
        assert!(report.has_errors());
    }
}
