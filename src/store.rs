//! Aggregation store.
//!
//! Layout under the store root:
//!
//! ```text
//! runs/<day>/<stamp>.jsonl   one file per run, write-once
//! daily/<day>.jsonl          deduplicated union of the day's runs
//! all.jsonl                  deduplicated union of every run
//! latest.jsonl               the most recent run's records
//! meta/runs_log.jsonl        one row per run, never deduplicated
//! ```
//!
//! Every file is replaced through a temp file and a rename in the same
//! directory, so readers only ever see a complete old or new version. A run
//! commits in a fixed order: run file, daily, all, latest, log. If any step
//! fails the later ones are not attempted.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{HarvestError, Result};
use crate::fingerprint::merge;
use crate::model::{Record, RunLogEntry, RunSummary};

pub const RUNS_DIR: &str = "runs";
pub const DAILY_DIR: &str = "daily";
pub const META_DIR: &str = "meta";
pub const ALL_FILE: &str = "all.jsonl";
pub const LATEST_FILE: &str = "latest.jsonl";
pub const LOG_FILE: &str = "runs_log.jsonl";
pub const EXTENSION: &str = "jsonl";

/// Highest `-<n>` suffix tried when runs share a stamp.
const MAX_RUN_SUFFIX: u32 = 999;

/// Day and stamp of a run, fixed when the run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub started_at: DateTime<Utc>,
    /// UTC calendar date, `%Y-%m-%d`.
    pub day: String,
    /// UTC timestamp, `%Y%m%dT%H%M%SZ`.
    pub stamp: String,
}

impl RunContext {
    #[must_use]
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    #[must_use]
    pub fn at(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            day: started_at.format("%Y-%m-%d").to_string(),
            stamp: started_at.format("%Y%m%dT%H%M%SZ").to_string(),
        }
    }

    /// Run file path relative to the store root.
    #[must_use]
    pub fn run_file(&self) -> String {
        self.numbered_run_file(0)
    }

    /// Run file for the `n`th run sharing this stamp; 0 is the plain name.
    #[must_use]
    pub fn numbered_run_file(&self, n: u32) -> String {
        if n == 0 {
            format!("{RUNS_DIR}/{}/{}.{EXTENSION}", self.day, self.stamp)
        } else {
            format!("{RUNS_DIR}/{}/{}-{n}.{EXTENSION}", self.day, self.stamp)
        }
    }

    /// Daily file path relative to the store root.
    #[must_use]
    pub fn daily_file(&self) -> String {
        format!("{DAILY_DIR}/{}.{EXTENSION}", self.day)
    }
}

/// A line that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLine {
    /// 1-based line number.
    pub line: usize,
    pub reason: String,
}

/// Records read from a collection file, with anything that failed to parse.
#[derive(Debug, Clone, Default)]
pub struct LoadedRecords {
    pub records: Vec<Record>,
    pub malformed: Vec<MalformedLine>,
}

/// On-disk run, daily and all-time collections plus the run log.
#[derive(Debug, Clone)]
pub struct AggregationStore {
    root: PathBuf,
    latest_enabled: bool,
}

impl AggregationStore {
    /// Store rooted at `root`. Directories are created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            latest_enabled: true,
        }
    }

    /// Open a store that must already exist.
    ///
    /// # Errors
    /// Returns [`HarvestError::StoreNotFound`] when `root` is not a directory.
    pub fn open_existing(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(HarvestError::store_not_found(root));
        }
        Ok(Self::new(root))
    }

    /// Whether `latest.jsonl` is rewritten on commit.
    #[must_use]
    pub const fn with_latest(mut self, enabled: bool) -> Self {
        self.latest_enabled = enabled;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    #[must_use]
    pub fn all_path(&self) -> PathBuf {
        self.root.join(ALL_FILE)
    }

    #[must_use]
    pub fn latest_path(&self) -> PathBuf {
        self.root.join(LATEST_FILE)
    }

    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.root.join(META_DIR).join(LOG_FILE)
    }

    #[must_use]
    pub fn daily_dir(&self) -> PathBuf {
        self.root.join(DAILY_DIR)
    }

    #[must_use]
    pub fn runs_dir(&self) -> PathBuf {
        self.root.join(RUNS_DIR)
    }

    /// Persist a run collection exactly as given.
    ///
    /// Run files are never overwritten. When another run already took this
    /// stamp the file gets a `-1`, `-2`, ... suffix; day and stamp stay as
    /// they are. Returns the file used, relative to the root, and the row
    /// count.
    ///
    /// # Errors
    /// Returns [`HarvestError::RunExists`] once every suffix is taken, or a
    /// path error if the file cannot be written.
    pub fn write_run(&self, ctx: &RunContext, records: &[Record]) -> Result<(String, usize)> {
        let relative = self.reserve_run_file(ctx)?;
        let path = self.resolve(&relative);
        write_jsonl(&path, records)?;
        debug!(path = %path.display(), rows = records.len(), "Wrote run file");
        Ok((relative, records.len()))
    }

    /// Claim the first free run file name by creating it empty.
    fn reserve_run_file(&self, ctx: &RunContext) -> Result<String> {
        for n in 0..=MAX_RUN_SUFFIX {
            let relative = ctx.numbered_run_file(n);
            let path = self.resolve(&relative);
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)
                    .map_err(|e| HarvestError::path_error("create directory", dir, e))?;
            }
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => {
                    if n > 0 {
                        warn!(
                            stamp = %ctx.stamp,
                            file = %relative,
                            "Run stamp already taken, using suffix"
                        );
                    }
                    return Ok(relative);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(HarvestError::path_error("create", path, e)),
            }
        }
        Err(HarvestError::RunExists {
            path: self.resolve(&ctx.run_file()),
        })
    }

    /// Merge into the run day's collection. Returns the new row count.
    ///
    /// # Errors
    /// Returns an error if the daily file cannot be read or written.
    pub fn merge_daily(&self, ctx: &RunContext, records: &[Record]) -> Result<usize> {
        self.merge_into(&self.resolve(&ctx.daily_file()), records)
    }

    /// Merge into the all-time collection. Returns the new row count.
    ///
    /// # Errors
    /// Returns an error if `all.jsonl` cannot be read or written.
    pub fn merge_all(&self, records: &[Record]) -> Result<usize> {
        self.merge_into(&self.all_path(), records)
    }

    fn merge_into(&self, path: &Path, records: &[Record]) -> Result<usize> {
        let existing = self.read_records(path)?;
        let before = existing.len();
        let merged = merge(existing, records);
        write_jsonl(path, &merged)?;
        debug!(
            path = %path.display(),
            before,
            incoming = records.len(),
            after = merged.len(),
            "Merged collection"
        );
        Ok(merged.len())
    }

    /// Overwrite `latest.jsonl` with this run's records.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn write_latest(&self, records: &[Record]) -> Result<()> {
        write_jsonl(&self.latest_path(), records)
    }

    /// Add one row to the run log. Returns the log length afterwards.
    ///
    /// # Errors
    /// Returns a parse error if the existing log is malformed; the log is
    /// left untouched in that case.
    pub fn append_log(&self, entry: &RunLogEntry) -> Result<usize> {
        let mut rows = self.read_log()?;
        rows.push(entry.clone());
        write_jsonl(&self.log_path(), &rows)?;
        Ok(rows.len())
    }

    /// Persist a run: run file, daily, all, latest, then the log row.
    ///
    /// `records` should already be deduplicated; it is written to the run
    /// file verbatim and the same slice feeds both merges.
    ///
    /// # Errors
    /// Stops at the first failing step and returns its error.
    pub fn commit(&self, ctx: &RunContext, records: &[Record]) -> Result<RunSummary> {
        let (run_file, run_rows) = self.write_run(ctx, records)?;
        let daily_rows = self.merge_daily(ctx, records)?;
        let all_rows = self.merge_all(records)?;
        if self.latest_enabled {
            self.write_latest(records)?;
        }

        let summary = RunSummary {
            day: ctx.day.clone(),
            stamp: ctx.stamp.clone(),
            run_file,
            daily_file: ctx.daily_file(),
            all_file: ALL_FILE.to_string(),
            log_file: format!("{META_DIR}/{LOG_FILE}"),
            run_rows,
            daily_rows,
            all_rows,
        };
        self.append_log(&summary.log_entry())?;

        info!(
            day = %summary.day,
            stamp = %summary.stamp,
            run_rows,
            daily_rows,
            all_rows,
            "Committed run"
        );
        Ok(summary)
    }

    /// Read a record collection, skipping malformed lines with a warning.
    /// A missing file is an empty collection.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read.
    pub fn read_records(&self, path: &Path) -> Result<Vec<Record>> {
        let loaded = self.load_records(path)?;
        for bad in &loaded.malformed {
            warn!(
                path = %path.display(),
                line = bad.line,
                reason = %bad.reason,
                "Skipping malformed record line"
            );
        }
        Ok(loaded.records)
    }

    /// Read a record collection and report malformed lines instead of
    /// logging them.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read.
    pub fn load_records(&self, path: &Path) -> Result<LoadedRecords> {
        let Some(content) = read_optional(path)? else {
            return Ok(LoadedRecords::default());
        };

        let mut loaded = LoadedRecords::default();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Record>(line) {
                Ok(record) => loaded.records.push(record),
                Err(e) => loaded.malformed.push(MalformedLine {
                    line: idx + 1,
                    reason: e.to_string(),
                }),
            }
        }
        Ok(loaded)
    }

    /// Read the run log. A missing log is empty.
    ///
    /// # Errors
    /// Returns a parse error naming the first malformed row.
    pub fn read_log(&self) -> Result<Vec<RunLogEntry>> {
        let path = self.log_path();
        let Some(content) = read_optional(&path)? else {
            return Ok(Vec::new());
        };

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str(line).map_err(|e| {
                    HarvestError::parse_error(
                        path.display().to_string(),
                        format!("line {}: {e}", idx + 1),
                    )
                })
            })
            .collect()
    }

    /// Daily collection files, sorted by day.
    ///
    /// # Errors
    /// Returns an error if the daily directory cannot be listed.
    pub fn daily_files(&self) -> Result<Vec<PathBuf>> {
        let dir = self.daily_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(HarvestError::path_error("list", dir, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| HarvestError::path_error("list", &dir, e))?.path();
            if path.extension().is_some_and(|ext| ext == EXTENSION) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Every run file under `runs/`, as paths relative to the root.
    #[must_use]
    pub fn run_files(&self) -> Vec<String> {
        let mut files: Vec<String> = walkdir::WalkDir::new(self.runs_dir())
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == EXTENSION))
            .filter_map(|entry| {
                entry
                    .path()
                    .strip_prefix(&self.root)
                    .ok()
                    .map(|rel| rel.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        files.sort();
        files
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(HarvestError::path_error("read", path, e)),
    }
}

/// Replace `path` with one JSON object per line.
///
/// The rows are written to a sibling temp file which is then renamed over
/// the target.
///
/// # Errors
/// Returns a path error if any filesystem step fails. The target is left
/// untouched in that case.
pub fn write_jsonl<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| HarvestError::path_error("create directory", dir, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{file_name}.tmp"));

    let result = write_rows(&tmp, rows)
        .and_then(|()| fs::rename(&tmp, path).map_err(|e| HarvestError::path_error("rename", path, e)));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_rows<T: Serialize>(tmp: &Path, rows: &[T]) -> Result<()> {
    let file = File::create(tmp).map_err(|e| HarvestError::path_error("create", tmp, e))?;
    let mut writer = BufWriter::new(file);
    for row in rows {
        serde_json::to_writer(&mut writer, row)?;
        writer
            .write_all(b"\n")
            .map_err(|e| HarvestError::path_error("write", tmp, e))?;
    }
    let file = writer
        .into_inner()
        .map_err(|e| HarvestError::path_error("flush", tmp, e.into_error()))?;
    file.sync_all()
        .map_err(|e| HarvestError::path_error("sync", tmp, e))
}

/// Decode a JSON-lines file strictly. Used for imports.
///
/// # Errors
/// Returns a parse error naming the first malformed line.
pub fn read_jsonl_strict<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content =
        fs::read_to_string(path).map_err(|e| HarvestError::path_error("read", path, e))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|e| {
                HarvestError::parse_error(
                    path.display().to_string(),
                    format!("line {}: {e}", idx + 1),
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Author;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn ctx(hour: u32, minute: u32) -> RunContext {
        RunContext::at(Utc.with_ymd_and_hms(2025, 1, 8, hour, minute, 0).unwrap())
    }

    fn record(text: &str, url: Option<&str>, ts: &str) -> Record {
        Record {
            keyword: "bitcoin".to_string(),
            text: text.to_string(),
            timestamp: Some(ts.to_string()),
            identity_url: url.map(String::from),
            author: Author {
                username: Some("alice".to_string()),
                ..Author::default()
            },
            ..Record::default()
        }
    }

    #[test]
    fn run_context_formats() {
        let c = ctx(23, 59);
        assert_eq!(c.day, "2025-01-08");
        assert_eq!(c.stamp, "20250108T235900Z");
        assert_eq!(c.run_file(), "runs/2025-01-08/20250108T235900Z.jsonl");
        assert_eq!(c.daily_file(), "daily/2025-01-08.jsonl");
    }

    #[test]
    fn disjoint_runs_accumulate() {
        let dir = TempDir::new().unwrap();
        let store = AggregationStore::new(dir.path());
        let r1 = vec![record("one one one", None, "t1"), record("two two two", None, "t2")];
        let r2 = vec![record("three three", None, "t3")];

        store.commit(&ctx(10, 0), &r1).unwrap();
        let summary = store.commit(&ctx(11, 0), &r2).unwrap();

        assert_eq!(summary.all_rows, r1.len() + r2.len());
        assert_eq!(summary.daily_rows, 3);
        assert_eq!(store.read_records(&store.all_path()).unwrap().len(), 3);
    }

    #[test]
    fn duplicate_across_runs_keeps_first_copy() {
        let dir = TempDir::new().unwrap();
        let store = AggregationStore::new(dir.path());
        let mut first = record("shared text", Some("https://x.example/1"), "t1");
        first.engagement.like = 1;
        let mut second = first.clone();
        second.engagement.like = 500;

        store.commit(&ctx(10, 0), &[first]).unwrap();
        let summary = store.commit(&ctx(11, 0), &[second]).unwrap();

        assert_eq!(summary.all_rows, 1);
        let all = store.read_records(&store.all_path()).unwrap();
        assert_eq!(all[0].engagement.like, 1);
        // The run file itself still holds what the run saw.
        let run = store.read_records(&store.resolve(&ctx(11, 0).run_file())).unwrap();
        assert_eq!(run[0].engagement.like, 500);
    }

    #[test]
    fn shared_permalink_and_timestamp_collapse_in_daily() {
        let dir = TempDir::new().unwrap();
        let store = AggregationStore::new(dir.path());
        let a = record("first copy", Some("https://x.example/1"), "t1");
        let b = record("second copy", Some("https://x.example/1"), "t1");

        let summary = store.commit(&ctx(9, 30), &[a, b]).unwrap();
        assert_eq!(summary.run_rows, 2);
        assert_eq!(summary.daily_rows, 1);

        let daily = store
            .read_records(&store.resolve(&ctx(9, 30).daily_file()))
            .unwrap();
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].text, "first copy");

        let log = store.read_log().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].run_rows, 2);
        assert_eq!(log[0].daily_rows, 1);
    }

    #[test]
    fn shared_permalink_with_new_timestamp_is_kept() {
        let dir = TempDir::new().unwrap();
        let store = AggregationStore::new(dir.path());
        let a = record("same", Some("https://x.example/1"), "t1");
        let b = record("same", Some("https://x.example/1"), "t2");
        let summary = store.commit(&ctx(9, 0), &[a, b]).unwrap();
        assert_eq!(summary.daily_rows, 2);
    }

    #[test]
    fn log_gains_one_row_per_run() {
        let dir = TempDir::new().unwrap();
        let store = AggregationStore::new(dir.path());
        store.commit(&ctx(1, 0), &[record("aaaa aaaa", None, "1")]).unwrap();
        store.commit(&ctx(2, 0), &[record("aaaa aaaa", None, "1")]).unwrap();
        store.commit(&ctx(3, 0), &[]).unwrap();

        let log = store.read_log().unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[1].run_rows, 1);
        assert_eq!(log[1].all_rows, 1);
        assert_eq!(log[2].run_file, "runs/2025-01-08/20250108T030000Z.jsonl");
    }

    #[test]
    fn runs_in_the_same_second_get_their_own_file() {
        let dir = TempDir::new().unwrap();
        let store = AggregationStore::new(dir.path());
        let first = store.commit(&ctx(5, 0), &[record("first run!", None, "1")]).unwrap();
        let second = store.commit(&ctx(5, 0), &[record("second run", None, "2")]).unwrap();
        let third = store.commit(&ctx(5, 0), &[]).unwrap();

        assert_eq!(first.run_file, "runs/2025-01-08/20250108T050000Z.jsonl");
        assert_eq!(second.run_file, "runs/2025-01-08/20250108T050000Z-1.jsonl");
        assert_eq!(third.run_file, "runs/2025-01-08/20250108T050000Z-2.jsonl");
        assert_eq!(second.stamp, first.stamp);
        assert_eq!(second.all_rows, 2);

        // The first run file is untouched.
        let run = store.read_records(&store.resolve(&first.run_file)).unwrap();
        assert_eq!(run.len(), 1);
        assert_eq!(run[0].text, "first run!");

        let log = store.read_log().unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[1].run_file, second.run_file);
    }

    #[test]
    fn failed_daily_write_keeps_previous_state() {
        let dir = TempDir::new().unwrap();
        let store = AggregationStore::new(dir.path());
        store.commit(&ctx(1, 0), &[record("first run!", None, "1")]).unwrap();

        let daily = store.resolve(&ctx(1, 0).daily_file());
        let daily_before = fs::read(&daily).unwrap();
        let all_before = fs::read(store.all_path()).unwrap();
        let log_before = fs::read(store.log_path()).unwrap();

        // A directory in place of the temp file makes the daily write fail.
        fs::create_dir(store.daily_dir().join(".2025-01-08.jsonl.tmp")).unwrap();
        let err = store
            .commit(&ctx(2, 0), &[record("second run", None, "2")])
            .unwrap_err();

        assert!(matches!(err, HarvestError::PathError { .. }));
        assert!(err.is_persistence_failure());
        assert_eq!(fs::read(&daily).unwrap(), daily_before);
        assert_eq!(fs::read(store.all_path()).unwrap(), all_before);
        assert_eq!(fs::read(store.log_path()).unwrap(), log_before);
        assert_eq!(store.read_log().unwrap().len(), 1);
    }

    #[test]
    fn malformed_record_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let store = AggregationStore::new(dir.path());
        let good = serde_json::to_string(&record("fine record", None, "t")).unwrap();
        fs::write(store.all_path(), format!("{good}\nnot json\n\n")).unwrap();

        let loaded = store.load_records(&store.all_path()).unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.malformed.len(), 1);
        assert_eq!(loaded.malformed[0].line, 2);
    }

    #[test]
    fn malformed_log_blocks_append() {
        let dir = TempDir::new().unwrap();
        let store = AggregationStore::new(dir.path());
        fs::create_dir_all(dir.path().join(META_DIR)).unwrap();
        fs::write(store.log_path(), "{broken\n").unwrap();

        let err = store.commit(&ctx(6, 0), &[]).unwrap_err();
        assert!(matches!(err, HarvestError::ParseError { .. }));
        assert_eq!(fs::read_to_string(store.log_path()).unwrap(), "{broken\n");
    }

    #[test]
    fn latest_is_overwritten_and_optional() {
        let dir = TempDir::new().unwrap();
        let store = AggregationStore::new(dir.path());
        store.commit(&ctx(1, 0), &[record("first run!", None, "1")]).unwrap();
        store.commit(&ctx(2, 0), &[record("second run", None, "2")]).unwrap();
        let latest = store.read_records(&store.latest_path()).unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].text, "second run");

        let other = TempDir::new().unwrap();
        let no_latest = AggregationStore::new(other.path()).with_latest(false);
        no_latest.commit(&ctx(1, 0), &[]).unwrap();
        assert!(!no_latest.latest_path().exists());
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = AggregationStore::new(dir.path());
        store.commit(&ctx(1, 0), &[record("some text", None, "1")]).unwrap();
        let leftovers = walkdir::WalkDir::new(dir.path())
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
        assert_eq!(store.run_files(), vec![ctx(1, 0).run_file()]);
        assert_eq!(store.daily_files().unwrap().len(), 1);
    }

    #[test]
    fn open_existing_requires_directory() {
        let dir = TempDir::new().unwrap();
        assert!(AggregationStore::open_existing(dir.path()).is_ok());
        assert!(matches!(
            AggregationStore::open_existing(dir.path().join("missing")),
            Err(HarvestError::StoreNotFound { .. })
        ));
    }
}
