//! Record normalizer.
//!
//! Maps [`RawNode`]s onto the canonical [`Record`] and [`Comment`] schema.
//! Validation happens once, here: a node either becomes a well-formed value
//! or is rejected with a [`SkipReason`] that callers can count and report.

use std::fmt;

use crate::enrich::EnrichmentCache;
use crate::extract::{AuthorLink, RawAuthor, RawNode};
use crate::model::{Author, Comment, Engagement, Record, SearchMode};
use crate::numeric::parse_count;
use crate::provider::{DocumentProvider, ProviderError};

/// First path segments that belong to the site rather than to an account.
const SYSTEM_PATHS: &[&str] = &[
    "i",
    "search",
    "hashtag",
    "home",
    "explore",
    "notifications",
    "messages",
    "settings",
    "compose",
];

/// Why a node was not turned into a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No text element rendered.
    MissingText,
    /// Text rendered but is shorter than the configured minimum.
    TextTooShort { len: usize, min: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingText => f.write_str("missing text"),
            Self::TextTooShort { len, min } => {
                write!(f, "text too short ({len} < {min} chars)")
            }
        }
    }
}

/// Turns raw nodes into records.
#[derive(Debug, Clone, Copy)]
pub struct RecordNormalizer {
    pub min_text_chars: usize,
    pub min_comment_chars: usize,
}

impl Default for RecordNormalizer {
    fn default() -> Self {
        Self {
            min_text_chars: 8,
            min_comment_chars: 3,
        }
    }
}

impl RecordNormalizer {
    #[must_use]
    pub const fn new(min_text_chars: usize, min_comment_chars: usize) -> Self {
        Self {
            min_text_chars,
            min_comment_chars,
        }
    }

    /// Validate a node and build a record without touching the network.
    ///
    /// Author follower/following counts are left at zero; see [`Self::enrich`].
    ///
    /// # Errors
    /// Returns a [`SkipReason`] when the text is missing or too short.
    pub fn prepare(
        &self,
        node: &RawNode,
        keyword: &str,
        mode: SearchMode,
    ) -> Result<Record, SkipReason> {
        let text = checked_text(node.text.as_deref(), self.min_text_chars)?;

        Ok(Record {
            keyword: keyword.to_string(),
            mode,
            text,
            timestamp: node.timestamp.clone(),
            identity_url: node.permalinks.first().cloned(),
            engagement: engagement(node),
            author: resolve_author(&node.author),
            comments: Vec::new(),
            comments_count: 0,
        })
    }

    /// Fill in follower/following counts through the cache.
    ///
    /// Does nothing when no username was resolved.
    ///
    /// # Errors
    /// Passes on the provider error when the cache could not return from a
    /// profile page.
    pub fn enrich(
        &self,
        record: &mut Record,
        cache: &mut EnrichmentCache,
        provider: &mut dyn DocumentProvider,
    ) -> Result<(), ProviderError> {
        let Some(username) = record.author.username.as_deref() else {
            return Ok(());
        };
        let counts = cache.lookup(provider, username)?;
        record.author.follower_count = counts.followers;
        record.author.following_count = counts.following;
        Ok(())
    }

    /// Build a comment from a reply node. Comments are never enriched.
    ///
    /// # Errors
    /// Returns a [`SkipReason`] when the text is missing or too short.
    pub fn normalize_comment(&self, node: &RawNode) -> Result<Comment, SkipReason> {
        let text = checked_text(node.text.as_deref(), self.min_comment_chars)?;

        Ok(Comment {
            text,
            timestamp: node.timestamp.clone(),
            engagement: engagement(node),
            author: resolve_author(&node.author),
        })
    }
}

fn checked_text(text: Option<&str>, min: usize) -> Result<String, SkipReason> {
    let text = text.map(str::trim).unwrap_or_default();
    if text.is_empty() {
        return Err(SkipReason::MissingText);
    }
    let len = text.chars().count();
    if len < min {
        return Err(SkipReason::TextTooShort { len, min });
    }
    Ok(text.to_string())
}

fn engagement(node: &RawNode) -> Engagement {
    Engagement {
        reply: parse_count(node.reply.as_deref()),
        repost: parse_count(node.repost.as_deref()),
        like: parse_count(node.like.as_deref()),
        view: parse_count(node.view.as_deref()),
    }
}

/// Resolve the author, structured block first, loose links second.
#[must_use]
pub fn resolve_author(raw: &RawAuthor) -> Author {
    if let Some((username, link)) = first_profile(&raw.block_links) {
        return Author {
            username: Some(username),
            display_name: link
                .label
                .clone()
                .or_else(|| raw.block_display_name.clone()),
            ..Author::default()
        };
    }

    if let Some((username, link)) = first_profile(&raw.loose_links) {
        return Author {
            username: Some(username),
            display_name: link.label.clone(),
            ..Author::default()
        };
    }

    Author {
        display_name: raw.block_display_name.clone(),
        ..Author::default()
    }
}

fn first_profile(links: &[AuthorLink]) -> Option<(String, &AuthorLink)> {
    links
        .iter()
        .find_map(|link| profile_username(&link.href).map(|name| (name, link)))
}

/// Username from a site-relative profile href, if the href is one.
///
/// Rejects post permalinks, protocol-relative URLs and system paths.
#[must_use]
pub fn profile_username(href: &str) -> Option<String> {
    if !href.starts_with('/') || href.starts_with("//") || href.contains("/status/") {
        return None;
    }
    let path = href.split(['?', '#']).next().unwrap_or_default();
    let first = path.trim_matches('/').split('/').next()?;
    if first.is_empty() || SYSTEM_PATHS.contains(&first) {
        return None;
    }
    Some(first.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::{EnrichmentCache, NoopFetcher};
    use crate::provider::ReplayProvider;

    fn link(href: &str, label: Option<&str>) -> AuthorLink {
        AuthorLink {
            href: href.to_string(),
            label: label.map(String::from),
        }
    }

    fn node(text: Option<&str>) -> RawNode {
        RawNode {
            text: text.map(String::from),
            timestamp: Some("2025-01-08T12:00:00.000Z".to_string()),
            permalinks: vec!["https://x.com/alice/status/1".to_string()],
            reply: Some("4".to_string()),
            repost: Some("1.5K".to_string()),
            like: Some("2M".to_string()),
            view: None,
            author: RawAuthor {
                block_links: vec![link("/alice", Some("Alice"))],
                block_display_name: Some("Alice".to_string()),
                loose_links: vec![],
            },
        }
    }

    #[test]
    fn prepare_builds_record() {
        let normalizer = RecordNormalizer::default();
        let record = normalizer
            .prepare(&node(Some("  hello bitcoin world  ")), "bitcoin", SearchMode::Live)
            .unwrap();
        assert_eq!(record.text, "hello bitcoin world");
        assert_eq!(record.mode, SearchMode::Live);
        assert_eq!(record.identity_url.as_deref(), Some("https://x.com/alice/status/1"));
        assert_eq!(record.engagement.repost, 1_500);
        assert_eq!(record.engagement.like, 2_000_000);
        assert_eq!(record.engagement.view, 0);
        assert_eq!(record.author.username.as_deref(), Some("alice"));
        assert_eq!(record.comments_count, 0);
    }

    #[test]
    fn missing_or_short_text_is_skipped() {
        let normalizer = RecordNormalizer::default();
        assert_eq!(
            normalizer.prepare(&node(None), "k", SearchMode::Default),
            Err(SkipReason::MissingText)
        );
        assert_eq!(
            normalizer.prepare(&node(Some("   ")), "k", SearchMode::Default),
            Err(SkipReason::MissingText)
        );
        assert_eq!(
            normalizer.prepare(&node(Some("short")), "k", SearchMode::Default),
            Err(SkipReason::TextTooShort { len: 5, min: 8 })
        );
    }

    #[test]
    fn comment_threshold_is_separate() {
        let normalizer = RecordNormalizer::default();
        assert!(normalizer.normalize_comment(&node(Some("ok!"))).is_ok());
        assert!(normalizer.normalize_comment(&node(Some("no"))).is_err());
    }

    #[test]
    fn author_block_wins_over_loose_links() {
        let raw = RawAuthor {
            block_links: vec![link("/bob/status/9", None), link("/bob", Some("Bob"))],
            block_display_name: Some("Bob B".to_string()),
            loose_links: vec![link("/carol", Some("Carol"))],
        };
        let author = resolve_author(&raw);
        assert_eq!(author.username.as_deref(), Some("bob"));
        assert_eq!(author.display_name.as_deref(), Some("Bob"));
    }

    #[test]
    fn loose_links_are_the_fallback() {
        let raw = RawAuthor {
            block_links: vec![],
            block_display_name: None,
            loose_links: vec![
                link("/hashtag/btc", None),
                link("/i/lists/1", None),
                link("/dave", Some("Dave")),
            ],
        };
        let author = resolve_author(&raw);
        assert_eq!(author.username.as_deref(), Some("dave"));
        assert_eq!(author.display_name.as_deref(), Some("Dave"));
    }

    #[test]
    fn no_plausible_link_leaves_username_empty() {
        let raw = RawAuthor {
            block_links: vec![],
            block_display_name: Some("Someone".to_string()),
            loose_links: vec![link("//cdn/x", None), link("/search?q=a", None)],
        };
        let author = resolve_author(&raw);
        assert!(author.username.is_none());
        assert_eq!(author.display_name.as_deref(), Some("Someone"));
    }

    #[test]
    fn profile_username_rules() {
        assert_eq!(profile_username("/alice").as_deref(), Some("alice"));
        assert_eq!(profile_username("/alice/photo").as_deref(), Some("alice"));
        assert_eq!(profile_username("/alice?s=20").as_deref(), Some("alice"));
        assert!(profile_username("/alice/status/1").is_none());
        assert!(profile_username("//evil").is_none());
        assert!(profile_username("https://x.com/alice").is_none());
        assert!(profile_username("/explore").is_none());
        assert!(profile_username("/").is_none());
    }

    #[test]
    fn unresolved_author_is_not_enriched() {
        let normalizer = RecordNormalizer::default();
        let mut cache = EnrichmentCache::new(Box::new(NoopFetcher));
        let mut provider = ReplayProvider::default();
        let mut n = node(Some("text long enough"));
        n.author = RawAuthor::default();

        let mut record = normalizer.prepare(&n, "k", SearchMode::Default).unwrap();
        normalizer
            .enrich(&mut record, &mut cache, &mut provider)
            .unwrap();
        assert_eq!(record.author.follower_count, 0);
        assert_eq!(cache.stats().misses, 0);
    }
}
