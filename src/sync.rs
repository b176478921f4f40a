//! Sync gateway boundary.
//!
//! Publishing the store (to a dataset host, a git remote, a bucket) is not
//! done here. The crate produces a commit message and hands the store root to
//! a [`SyncGateway`] once every file of the run is fully written.

use std::path::Path;
use std::process::Command;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{HarvestError, Result};
use crate::model::RunSummary;

/// Placeholder replaced by the store root in gateway commands.
pub const ROOT_PLACEHOLDER: &str = "{root}";
/// Placeholder replaced by the commit message in gateway commands.
pub const MESSAGE_PLACEHOLDER: &str = "{message}";

/// Something that can publish the store directory.
pub trait SyncGateway {
    /// Publish `root` with a human-readable commit message.
    ///
    /// # Errors
    /// Returns [`HarvestError::Sync`] if publishing failed.
    fn publish(&self, root: &Path, message: &str) -> Result<()>;
}

/// Commit message for a run.
#[must_use]
pub fn commit_message(summary: &RunSummary) -> String {
    format!(
        "Scrape {} {} | run={} daily={} all={}",
        summary.day, summary.stamp, summary.run_rows, summary.daily_rows, summary.all_rows
    )
}

/// Outcome of the sync step, as reported to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncStatus {
    /// No gateway configured, or sync disabled for this run.
    Skipped,
    Published { message: String },
    Failed { message: String, reason: String },
}

/// Runs an external command, e.g. `["hf", "upload", "me/data", "{root}", "--commit-message", "{message}"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandGateway {
    argv: Vec<String>,
}

impl CommandGateway {
    /// Gateway for `argv`, or `None` when no program is given.
    #[must_use]
    pub fn new(argv: Vec<String>) -> Option<Self> {
        let has_program = argv.first().is_some_and(|p| !p.trim().is_empty());
        has_program.then_some(Self { argv })
    }

    /// The command line with placeholders substituted.
    #[must_use]
    pub fn render(&self, root: &Path, message: &str) -> Vec<String> {
        let root = root.display().to_string();
        self.argv
            .iter()
            .map(|arg| {
                arg.replace(ROOT_PLACEHOLDER, &root)
                    .replace(MESSAGE_PLACEHOLDER, message)
            })
            .collect()
    }
}

impl SyncGateway for CommandGateway {
    fn publish(&self, root: &Path, message: &str) -> Result<()> {
        let argv = self.render(root, message);
        let Some((program, args)) = argv.split_first() else {
            return Err(HarvestError::sync("empty sync command"));
        };

        debug!(program, ?args, "Running sync command");
        let output = Command::new(program)
            .args(args)
            .current_dir(root)
            .output()
            .map_err(|e| HarvestError::sync(format!("cannot start '{program}': {e}")))?;

        if output.status.success() {
            info!(program, "Store published");
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(HarvestError::sync(format!(
                "'{program}' exited with {}: {}",
                output.status,
                stderr.trim()
            )))
        }
    }
}
