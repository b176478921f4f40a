//! Data models for harvested X posts and the store's run ledger.
//!
//! Every field of [`Record`] carries a serde default so that rows written by
//! older or partial runs load without error.

use serde::{Deserialize, Serialize};

/// Which search tab a pass crawls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// The default ("Top") tab.
    #[default]
    Default,
    /// The "Latest" tab.
    Live,
}

impl SearchMode {
    /// Both modes, in crawl order.
    #[must_use]
    pub fn all() -> Vec<Self> {
        vec![Self::Default, Self::Live]
    }

    /// Query-string suffix appended to the search URL.
    #[must_use]
    pub const fn query_suffix(self) -> &'static str {
        match self {
            Self::Default => "",
            Self::Live => "&f=live",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Live => "live",
        }
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" | "top" => Ok(Self::Default),
            "live" | "latest" => Ok(Self::Live),
            _ => Err(format!("Invalid search mode: {s}")),
        }
    }
}

/// Engagement counters shown under a post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Engagement {
    pub reply: u64,
    pub repost: u64,
    pub like: u64,
    pub view: u64,
}

/// The account that wrote a post or reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Author {
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub follower_count: u64,
    pub following_count: u64,
}

/// Follower and following totals read from a profile page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileCounts {
    pub followers: u64,
    pub following: u64,
}

/// A reply harvested from a post's detail page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Comment {
    pub text: String,
    pub timestamp: Option<String>,
    pub engagement: Engagement,
    pub author: Author,
}

/// One harvested post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Record {
    pub keyword: String,
    pub mode: SearchMode,
    pub text: String,
    pub timestamp: Option<String>,
    pub identity_url: Option<String>,
    pub engagement: Engagement,
    pub author: Author,
    pub comments: Vec<Comment>,
    pub comments_count: usize,
}

impl Record {
    /// Replace the comment list, keeping `comments_count` in step.
    pub fn set_comments(&mut self, comments: Vec<Comment>) {
        self.comments_count = comments.len();
        self.comments = comments;
    }

    /// Whether the derived comment count matches the stored comments.
    #[must_use]
    pub fn comments_consistent(&self) -> bool {
        self.comments_count == self.comments.len()
    }

    /// Sort key used when ordering a run by engagement.
    #[must_use]
    pub const fn engagement_key(&self) -> (u64, u64, u64, u64) {
        (
            self.engagement.like,
            self.engagement.repost,
            self.engagement.reply,
            self.engagement.view,
        )
    }
}

/// One row of `meta/runs_log.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub day: String,
    pub run_stamp_utc: String,
    pub run_rows: usize,
    pub daily_rows: usize,
    pub all_rows: usize,
    pub run_file: String,
}

/// What a committed run produced, as handed to the sync gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub day: String,
    pub stamp: String,
    pub run_file: String,
    pub daily_file: String,
    pub all_file: String,
    pub log_file: String,
    pub run_rows: usize,
    pub daily_rows: usize,
    pub all_rows: usize,
}

impl RunSummary {
    /// The log row recorded for this run.
    #[must_use]
    pub fn log_entry(&self) -> RunLogEntry {
        RunLogEntry {
            day: self.day.clone(),
            run_stamp_utc: self.stamp.clone(),
            run_rows: self.run_rows,
            daily_rows: self.daily_rows,
            all_rows: self.all_rows,
            run_file: self.run_file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_comments_updates_count() {
        let mut record = Record::default();
        record.set_comments(vec![Comment::default(), Comment::default()]);
        assert_eq!(record.comments_count, 2);
        assert!(record.comments_consistent());
    }

    #[test]
    fn partial_rows_deserialize_with_defaults() {
        let record: Record =
            serde_json::from_str(r#"{"keyword":"bitcoin","text":"hello there world"}"#).unwrap();
        assert_eq!(record.mode, SearchMode::Default);
        assert_eq!(record.engagement, Engagement::default());
        assert!(record.author.username.is_none());
        assert!(record.comments.is_empty());
    }

    #[test]
    fn search_mode_parses_aliases() {
        assert_eq!("latest".parse::<SearchMode>().unwrap(), SearchMode::Live);
        assert_eq!("Top".parse::<SearchMode>().unwrap(), SearchMode::Default);
        assert!("trending".parse::<SearchMode>().is_err());
    }

    #[test]
    fn search_mode_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&SearchMode::Live).unwrap(), "\"live\"");
    }
}
