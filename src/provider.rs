//! Document provider boundary.
//!
//! Rendering pages, scrolling and session handling live outside this crate.
//! A [`DocumentProvider`] hands back raw markup on demand; browser drivers
//! implement it in their own crates. [`ReplayProvider`] replays markup that a
//! browser captured earlier, which is what the CLI and the tests use.
//!
//! # Replay directory layout
//!
//! ```text
//! capture/
//!   index.json          {"<locator>": ["search/0.html", "search/1.html"], ...}
//!   search/0.html
//!   search/1.html
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

/// Failure reported by a document provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The locator could not be opened.
    #[error("Navigation to '{locator}' failed: {reason}")]
    Navigation { locator: String, reason: String },

    /// There is no page to act on (e.g. `go_back` with empty history).
    #[error("No page loaded: {reason}")]
    NoPage { reason: String },

    /// The provider itself is unusable (crashed browser, unreadable capture).
    #[error("Provider unavailable: {reason}")]
    Unavailable { reason: String },
}

impl ProviderError {
    pub fn navigation(locator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Navigation {
            locator: locator.into(),
            reason: reason.into(),
        }
    }

    pub fn no_page(reason: impl Into<String>) -> Self {
        Self::NoPage {
            reason: reason.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Source of rendered markup.
///
/// Calls may be slow and may fail; callers decide whether a failure ends
/// the current pass. Nothing here is retried by the crate.
pub trait DocumentProvider {
    /// Markup of the page currently shown.
    ///
    /// # Errors
    /// Returns an error if no page is loaded or the page cannot be read.
    fn current_content(&mut self) -> Result<String, ProviderError>;

    /// Ask the page for more content (scroll the viewport).
    ///
    /// # Errors
    /// Returns an error if no page is loaded.
    fn advance_viewport(&mut self) -> Result<(), ProviderError>;

    /// Open `locator` and return its initial markup.
    ///
    /// # Errors
    /// Returns an error if the locator cannot be opened.
    fn navigate_to(&mut self, locator: &str) -> Result<String, ProviderError>;

    /// Return to the previous page.
    ///
    /// # Errors
    /// Returns an error if there is no previous page.
    fn go_back(&mut self) -> Result<(), ProviderError>;
}

impl<P: DocumentProvider + ?Sized> DocumentProvider for &mut P {
    fn current_content(&mut self) -> Result<String, ProviderError> {
        (**self).current_content()
    }

    fn advance_viewport(&mut self) -> Result<(), ProviderError> {
        (**self).advance_viewport()
    }

    fn navigate_to(&mut self, locator: &str) -> Result<String, ProviderError> {
        (**self).navigate_to(locator)
    }

    fn go_back(&mut self) -> Result<(), ProviderError> {
        (**self).go_back()
    }
}

/// Where a replayed page's frames come from.
#[derive(Debug, Clone)]
enum Frames {
    Inline(Vec<String>),
    Files(Vec<PathBuf>),
}

impl Frames {
    fn len(&self) -> usize {
        match self {
            Self::Inline(frames) => frames.len(),
            Self::Files(paths) => paths.len(),
        }
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn load(&self, index: usize) -> Result<String, ProviderError> {
        match self {
            Self::Inline(frames) => frames
                .get(index)
                .cloned()
                .ok_or_else(|| ProviderError::no_page("frame out of range")),
            Self::Files(paths) => {
                let path = paths
                    .get(index)
                    .ok_or_else(|| ProviderError::no_page("frame out of range"))?;
                std::fs::read_to_string(path).map_err(|e| {
                    ProviderError::unavailable(format!("cannot read {}: {e}", path.display()))
                })
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Visit {
    locator: String,
    frame: usize,
}

/// Replays captured page frames.
///
/// `navigate_to` serves frame 0 of the locator, `advance_viewport` steps to
/// the next frame and stays on the last one once the capture runs out.
#[derive(Debug, Clone, Default)]
pub struct ReplayProvider {
    pages: HashMap<String, Frames>,
    history: Vec<Visit>,
}

impl ReplayProvider {
    /// Build a provider from in-memory frames.
    #[must_use]
    pub fn from_pages(pages: HashMap<String, Vec<String>>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|(locator, frames)| (locator, Frames::Inline(frames)))
                .collect(),
            history: Vec::new(),
        }
    }

    /// Add or replace one locator's frames.
    pub fn insert_page(&mut self, locator: impl Into<String>, frames: Vec<String>) {
        self.pages.insert(locator.into(), Frames::Inline(frames));
    }

    /// Open a capture directory containing `index.json`.
    ///
    /// # Errors
    /// Returns an error if the index is missing or malformed, or references
    /// a frame file that does not exist.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, ProviderError> {
        let dir = dir.as_ref();
        let index_path = dir.join("index.json");
        let content = std::fs::read_to_string(&index_path).map_err(|e| {
            ProviderError::unavailable(format!("cannot read {}: {e}", index_path.display()))
        })?;
        let index: HashMap<String, Vec<String>> = serde_json::from_str(&content).map_err(|e| {
            ProviderError::unavailable(format!("invalid {}: {e}", index_path.display()))
        })?;

        let mut pages = HashMap::with_capacity(index.len());
        for (locator, files) in index {
            let paths: Vec<PathBuf> = files.iter().map(|f| dir.join(f)).collect();
            if let Some(missing) = paths.iter().find(|p| !p.is_file()) {
                return Err(ProviderError::unavailable(format!(
                    "frame {} listed for '{locator}' does not exist",
                    missing.display()
                )));
            }
            pages.insert(locator, Frames::Files(paths));
        }

        info!(
            "Opened replay capture {} ({} locators)",
            dir.display(),
            pages.len()
        );
        Ok(Self {
            pages,
            history: Vec::new(),
        })
    }

    /// Locators this provider can serve.
    #[must_use]
    pub fn locators(&self) -> Vec<&str> {
        let mut locators: Vec<&str> = self.pages.keys().map(String::as_str).collect();
        locators.sort_unstable();
        locators
    }

    fn current(&self) -> Result<(&Visit, &Frames), ProviderError> {
        let visit = self
            .history
            .last()
            .ok_or_else(|| ProviderError::no_page("nothing has been opened yet"))?;
        let frames = self
            .pages
            .get(&visit.locator)
            .ok_or_else(|| ProviderError::no_page(format!("'{}' vanished", visit.locator)))?;
        Ok((visit, frames))
    }
}

impl DocumentProvider for ReplayProvider {
    fn current_content(&mut self) -> Result<String, ProviderError> {
        let (visit, frames) = self.current()?;
        frames.load(visit.frame)
    }

    fn advance_viewport(&mut self) -> Result<(), ProviderError> {
        let (_, frames) = self.current()?;
        let last = frames.len().saturating_sub(1);
        if let Some(visit) = self.history.last_mut() {
            visit.frame = (visit.frame + 1).min(last);
            debug!(locator = %visit.locator, frame = visit.frame, "Advanced replay viewport");
        }
        Ok(())
    }

    fn navigate_to(&mut self, locator: &str) -> Result<String, ProviderError> {
        let frames = self
            .pages
            .get(locator)
            .ok_or_else(|| ProviderError::navigation(locator, "not present in capture"))?;
        if frames.is_empty() {
            return Err(ProviderError::navigation(locator, "capture has no frames"));
        }
        let markup = frames.load(0)?;
        self.history.push(Visit {
            locator: locator.to_string(),
            frame: 0,
        });
        Ok(markup)
    }

    fn go_back(&mut self) -> Result<(), ProviderError> {
        if self.history.len() < 2 {
            return Err(ProviderError::no_page("no previous page in history"));
        }
        self.history.pop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn provider() -> ReplayProvider {
        let mut pages = HashMap::new();
        pages.insert(
            "search".to_string(),
            vec!["<p>0</p>".to_string(), "<p>1</p>".to_string()],
        );
        pages.insert("post".to_string(), vec!["<p>post</p>".to_string()]);
        ReplayProvider::from_pages(pages)
    }

    #[test]
    fn advance_saturates_at_last_frame() {
        let mut p = provider();
        assert_eq!(p.navigate_to("search").unwrap(), "<p>0</p>");
        p.advance_viewport().unwrap();
        p.advance_viewport().unwrap();
        p.advance_viewport().unwrap();
        assert_eq!(p.current_content().unwrap(), "<p>1</p>");
    }

    #[test]
    fn go_back_restores_previous_frame() {
        let mut p = provider();
        p.navigate_to("search").unwrap();
        p.advance_viewport().unwrap();
        p.navigate_to("post").unwrap();
        p.go_back().unwrap();
        assert_eq!(p.current_content().unwrap(), "<p>1</p>");
    }

    #[test]
    fn unknown_locator_is_a_navigation_error() {
        let mut p = provider();
        let err = p.navigate_to("https://x.com/missing").unwrap_err();
        assert!(matches!(err, ProviderError::Navigation { .. }));
    }

    #[test]
    fn content_before_navigation_fails() {
        let mut p = provider();
        assert!(p.current_content().is_err());
        assert!(p.go_back().is_err());
    }

    #[test]
    fn open_reads_index_and_frames() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("s")).unwrap();
        std::fs::write(dir.path().join("s/0.html"), "<p>zero</p>").unwrap();
        std::fs::write(
            dir.path().join("index.json"),
            r#"{"https://x.com/search?q=a&src=typed_query": ["s/0.html"]}"#,
        )
        .unwrap();

        let mut p = ReplayProvider::open(dir.path()).unwrap();
        let html = p
            .navigate_to("https://x.com/search?q=a&src=typed_query")
            .unwrap();
        assert_eq!(html, "<p>zero</p>");
    }

    #[test]
    fn open_rejects_missing_frame() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.json"), r#"{"a": ["nope.html"]}"#).unwrap();
        assert!(matches!(
            ReplayProvider::open(dir.path()),
            Err(ProviderError::Unavailable { .. })
        ));
    }
}
