//! HTML extraction for rendered X pages.
//!
//! Turns rendered markup into loosely-typed [`RawNode`]s. Nothing here
//! decides whether a node is usable; that is the normalizer's job. Every
//! field is optional because partially rendered articles are common.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::model::ProfileCounts;
use crate::numeric::parse_count;

/// Origin used to absolutize relative permalinks.
pub const SITE_ORIGIN: &str = "https://x.com";

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css:?}: {e}"))
}

static ARTICLE: Lazy<Selector> = Lazy::new(|| selector("article"));
static TWEET_TEXT: Lazy<Selector> = Lazy::new(|| selector(r#"[data-testid="tweetText"]"#));
static TIME: Lazy<Selector> = Lazy::new(|| selector("time"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| selector("a[href]"));
static SPAN: Lazy<Selector> = Lazy::new(|| selector("span"));
static USER_NAME: Lazy<Selector> = Lazy::new(|| selector(r#"[data-testid="User-Name"]"#));
static REPLY: Lazy<Selector> = Lazy::new(|| {
    selector(r#"[data-testid="reply"], [data-testid="conversation"]"#)
});
static REPOST: Lazy<Selector> =
    Lazy::new(|| selector(r#"[data-testid="retweet"], [data-testid="repost"]"#));
static LIKE: Lazy<Selector> =
    Lazy::new(|| selector(r#"[data-testid="like"], [data-testid="favorite"]"#));
static VIEW_TESTID: Lazy<Selector> =
    Lazy::new(|| selector(r#"[data-testid="viewCount"], [data-testid="views"]"#));
static LABELLED: Lazy<Selector> = Lazy::new(|| selector("span[aria-label], div[aria-label]"));
static FOLLOWERS_LINK: Lazy<Selector> = Lazy::new(|| selector(r#"a[href*="/followers"]"#));
static FOLLOWING_LINK: Lazy<Selector> = Lazy::new(|| selector(r#"a[href*="/following"]"#));

static INTERSTITIAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)rate limit exceeded|something went wrong|try reloading")
        .unwrap_or_else(|e| panic!("invalid built-in pattern: {e}"))
});

/// A profile-looking link found inside an article.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorLink {
    pub href: String,
    /// Text of the first `<span>` inside the link (usually the display name).
    pub label: Option<String>,
}

/// Author evidence gathered from an article, in the order it was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawAuthor {
    /// Links inside the structured `User-Name` block, if the block rendered.
    pub block_links: Vec<AuthorLink>,
    /// First non-empty `<span>` text inside the `User-Name` block.
    pub block_display_name: Option<String>,
    /// Every other site-relative link in the article.
    pub loose_links: Vec<AuthorLink>,
}

/// One article as scraped, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawNode {
    pub text: Option<String>,
    pub timestamp: Option<String>,
    /// Permalink candidates, best first. Already absolute.
    pub permalinks: Vec<String>,
    pub reply: Option<String>,
    pub repost: Option<String>,
    pub like: Option<String>,
    pub view: Option<String>,
    pub author: RawAuthor,
}

/// Extract every `<article>` in the markup.
#[must_use]
pub fn extract_nodes(markup: &str) -> Vec<RawNode> {
    let document = Html::parse_document(markup);
    document.select(&ARTICLE).map(extract_node).collect()
}

/// Extract reply articles from a post's detail page.
///
/// The first article on a detail page is the post itself and is skipped.
#[must_use]
pub fn extract_reply_nodes(markup: &str, max: usize) -> Vec<RawNode> {
    let document = Html::parse_document(markup);
    document
        .select(&ARTICLE)
        .skip(1)
        .take(max)
        .map(extract_node)
        .collect()
}

/// Extract a single article element.
#[must_use]
pub fn extract_node(article: ElementRef<'_>) -> RawNode {
    let time = article.select(&TIME).next();

    RawNode {
        text: article
            .select(&TWEET_TEXT)
            .next()
            .map(spaced_text)
            .filter(|t| !t.is_empty()),
        timestamp: time
            .and_then(|t| t.value().attr("datetime"))
            .map(str::to_string),
        permalinks: permalink_candidates(article, time),
        reply: counter_text(article, &REPLY),
        repost: counter_text(article, &REPOST),
        like: counter_text(article, &LIKE),
        view: view_text(article),
        author: raw_author(article),
    }
}

/// Read follower/following totals from a profile page.
///
/// Returns `None` when neither link rendered.
#[must_use]
pub fn extract_profile_counts(markup: &str) -> Option<ProfileCounts> {
    let document = Html::parse_document(markup);
    let followers = document.select(&FOLLOWERS_LINK).next();
    let following = document.select(&FOLLOWING_LINK).next();
    if followers.is_none() && following.is_none() {
        return None;
    }

    let leading_count = |el: Option<ElementRef<'_>>| {
        el.map_or(0, |el| {
            let text = spaced_text(el);
            parse_count(text.split_whitespace().next())
        })
    };

    Some(ProfileCounts {
        followers: leading_count(followers),
        following: leading_count(following),
    })
}

/// Whether the markup is a rate-limit or error interstitial.
#[must_use]
pub fn is_interstitial(markup: &str) -> bool {
    INTERSTITIAL.is_match(markup)
}

/// Make a site-relative href absolute. Absolute URLs pass through.
#[must_use]
pub fn absolutize(href: &str) -> String {
    if href.starts_with('/') && !href.starts_with("//") {
        format!("{SITE_ORIGIN}{href}")
    } else {
        href.to_string()
    }
}

fn permalink_candidates(article: ElementRef<'_>, time: Option<ElementRef<'_>>) -> Vec<String> {
    let mut candidates = Vec::new();

    let time_link = time.and_then(|t| {
        t.ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "a")
    });
    if let Some(href) = time_link.and_then(|a| a.value().attr("href")) {
        if href.starts_with('/') {
            candidates.push(absolutize(href));
        }
    }

    for anchor in article.select(&ANCHOR) {
        if let Some(href) = anchor.value().attr("href") {
            if href.contains("/status/") {
                let url = absolutize(href);
                if !candidates.contains(&url) {
                    candidates.push(url);
                }
            }
        }
    }

    candidates
}

fn raw_author(article: ElementRef<'_>) -> RawAuthor {
    let block = article.select(&USER_NAME).next();

    let block_links = block
        .map(|b| b.select(&ANCHOR).filter_map(author_link).collect())
        .unwrap_or_default();
    let block_display_name = block.and_then(|b| {
        b.select(&SPAN)
            .map(tight_text)
            .find(|t| !t.is_empty())
    });
    let loose_links = article
        .select(&ANCHOR)
        .filter_map(author_link)
        .filter(|link| link.href.starts_with('/'))
        .collect();

    RawAuthor {
        block_links,
        block_display_name,
        loose_links,
    }
}

fn author_link(anchor: ElementRef<'_>) -> Option<AuthorLink> {
    let href = anchor.value().attr("href")?.to_string();
    let label = anchor
        .select(&SPAN)
        .next()
        .map(tight_text)
        .filter(|t| !t.is_empty());
    Some(AuthorLink { href, label })
}

fn counter_text(article: ElementRef<'_>, sel: &Selector) -> Option<String> {
    article.select(sel).next().map(tight_text)
}

fn view_text(article: ElementRef<'_>) -> Option<String> {
    if let Some(el) = article.select(&VIEW_TESTID).next() {
        return Some(tight_text(el));
    }
    article
        .select(&LABELLED)
        .find(|el| {
            el.value()
                .attr("aria-label")
                .is_some_and(|label| label.to_lowercase().contains("views"))
        })
        .map(tight_text)
}

/// Text nodes trimmed and joined with single spaces.
fn spaced_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text nodes trimmed and concatenated.
fn tight_text(el: ElementRef<'_>) -> String {
    el.text().map(str::trim).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE_HTML: &str = r#"
        <html><body>
        <article>
          <div data-testid="User-Name">
            <a href="/satoshi"><span>Satoshi N</span></a>
            <a href="/satoshi/status/111"><time datetime="2025-01-08T12:00:00.000Z">Jan 8</time></a>
          </div>
          <div data-testid="tweetText"><span>Bitcoin</span> <span>is a peer-to-peer cash system</span></div>
          <div data-testid="reply"><span>12</span></div>
          <div data-testid="retweet"><span>3.5K</span></div>
          <div data-testid="like"><span>1M</span></div>
          <div aria-label="4,210 views"><span>4,210</span></div>
        </article>
        <article>
          <div data-testid="tweetText">short</div>
        </article>
        </body></html>
    "#;

    #[test]
    fn extracts_fields_from_article() {
        let nodes = extract_nodes(ARTICLE_HTML);
        assert_eq!(nodes.len(), 2);

        let node = &nodes[0];
        assert_eq!(node.text.as_deref(), Some("Bitcoin is a peer-to-peer cash system"));
        assert_eq!(node.timestamp.as_deref(), Some("2025-01-08T12:00:00.000Z"));
        assert_eq!(node.permalinks[0], "https://x.com/satoshi/status/111");
        assert_eq!(node.reply.as_deref(), Some("12"));
        assert_eq!(node.repost.as_deref(), Some("3.5K"));
        assert_eq!(node.like.as_deref(), Some("1M"));
        assert_eq!(node.author.block_links[0].href, "/satoshi");
        assert_eq!(node.author.block_display_name.as_deref(), Some("Satoshi N"));
    }

    #[test]
    fn view_count_falls_back_to_aria_label() {
        let nodes = extract_nodes(ARTICLE_HTML);
        assert_eq!(nodes[0].view.as_deref(), Some("4,210"));
    }

    #[test]
    fn view_testid_wins_over_aria_label() {
        let html = r#"<article>
            <span aria-label="9 views">9</span>
            <div data-testid="viewCount">1.2K</div>
        </article>"#;
        assert_eq!(extract_nodes(html)[0].view.as_deref(), Some("1.2K"));
    }

    #[test]
    fn missing_pieces_stay_empty() {
        let nodes = extract_nodes(ARTICLE_HTML);
        let node = &nodes[1];
        assert_eq!(node.text.as_deref(), Some("short"));
        assert!(node.timestamp.is_none());
        assert!(node.permalinks.is_empty());
        assert!(node.author.block_links.is_empty());
    }

    #[test]
    fn status_link_is_used_without_time_anchor() {
        let html = r#"<article>
            <div data-testid="tweetText">no time anchor here at all</div>
            <a href="https://x.com/alice/status/42">link</a>
        </article>"#;
        let node = &extract_nodes(html)[0];
        assert_eq!(node.permalinks, vec!["https://x.com/alice/status/42".to_string()]);
    }

    #[test]
    fn reply_nodes_skip_the_main_post() {
        let html = r#"
            <article><div data-testid="tweetText">main post text</div></article>
            <article><div data-testid="tweetText">first reply</div></article>
            <article><div data-testid="tweetText">second reply</div></article>
            <article><div data-testid="tweetText">third reply</div></article>
        "#;
        let replies = extract_reply_nodes(html, 2);
        let texts: Vec<_> = replies.iter().filter_map(|n| n.text.as_deref()).collect();
        assert_eq!(texts, vec!["first reply", "second reply"]);
    }

    #[test]
    fn profile_counts_read_leading_token() {
        let html = r#"
            <a href="/satoshi/following"><span>312</span> <span>Following</span></a>
            <a href="/satoshi/followers"><span>1.5M</span> <span>Followers</span></a>
        "#;
        let counts = extract_profile_counts(html).unwrap();
        assert_eq!(counts.followers, 1_500_000);
        assert_eq!(counts.following, 312);
    }

    #[test]
    fn profile_without_links_is_none() {
        assert!(extract_profile_counts("<div>Something went wrong</div>").is_none());
    }

    #[test]
    fn detects_interstitials() {
        assert!(is_interstitial("<p>Rate limit exceeded.</p>"));
        assert!(is_interstitial("<p>Something went wrong. Try reloading.</p>"));
        assert!(!is_interstitial("<article>fine</article>"));
    }

    #[test]
    fn absolutize_handles_relative_and_protocol_relative() {
        assert_eq!(absolutize("/a/status/1"), "https://x.com/a/status/1");
        assert_eq!(absolutize("//cdn.example/x"), "//cdn.example/x");
        assert_eq!(absolutize("https://x.com/a"), "https://x.com/a");
    }
}
