//! Catch-up boundary detection.
//!
//! Incremental runs stop when they reach the newest post already published
//! in the previous feed. That post's permanent link is the high-water mark;
//! it is read back from the first `<item><link>` of the feed XML emitted by
//! the previous run, which is newest-first by construction.
//!
//! Links are compared in normalized form (query string and trailing slashes
//! stripped) because LinkedIn decorates the same permalink differently
//! depending on how it was resolved. The post matching the mark is itself
//! excluded from the new batch; it is already published.

use quick_xml::de::from_str;
use serde::Deserialize;
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

/// The newest already-published post link, as recovered from the previous
/// run's feed artifact.
///
/// Presence of a mark selects catch-up mode; absence (no feed yet, or an
/// unreadable one) selects bootstrap mode. Comparison always goes through
/// [`HighWaterMark::matches`], never raw string equality.
#[derive(Debug, Clone, PartialEq)]
pub struct HighWaterMark(String);

impl HighWaterMark {
    pub fn new(link: impl Into<String>) -> Self {
        HighWaterMark(link.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `candidate` is the already-published post this mark points at.
    pub fn matches(&self, candidate: &str) -> bool {
        normalize_post_link(candidate) == normalize_post_link(&self.0)
    }
}

/// Strip the query string and trailing slashes from a post link.
pub fn normalize_post_link(link: &str) -> String {
    link.split('?')
        .next()
        .unwrap_or(link)
        .trim_end_matches('/')
        .to_string()
}

// Only the item links matter here; every other feed element is skipped.
#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    link: Option<String>,
}

/// Read the high-water mark from a previously emitted feed file.
///
/// # Arguments
///
/// * `feed_xml` - Path to the feed XML written by the previous run
///
/// # Returns
///
/// The first item link found in document order, or `None` when the file is
/// missing or unparseable. Both cases mean the next run bootstraps.
pub async fn read_high_water_mark(feed_xml: &Path) -> Option<HighWaterMark> {
    let raw = match fs::read_to_string(feed_xml).await {
        Ok(raw) => raw,
        Err(_) => {
            debug!(path = %feed_xml.display(), "No previous feed file; first run for this page");
            return None;
        }
    };

    match from_str::<Rss>(&raw) {
        Ok(rss) => rss
            .channel
            .item
            .into_iter()
            .find_map(|item| item.link)
            .filter(|link| !link.is_empty())
            .map(HighWaterMark),
        Err(e) => {
            warn!(path = %feed_xml.display(), error = %e, "Could not parse previous feed; treating as first run");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<?xml-stylesheet type="text/xsl" href="rss-style.xsl"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>Master Concept</title>
    <link>https://www.linkedin.com/company/master-concept/</link>
    <description>Posts: 2 | Last Update: 2025-06-01 08:00 AM HKT</description>
    <item>
      <title>Newest post</title>
      <link>https://www.linkedin.com/posts/master-concept_a-activity-222</link>
      <description><![CDATA[Newest post body]]></description>
    </item>
    <item>
      <title>Older post</title>
      <link>https://www.linkedin.com/posts/master-concept_b-activity-111</link>
      <description><![CDATA[Older post body]]></description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_normalize_post_link() {
        assert_eq!(
            normalize_post_link("https://l/posts/x-activity-1/?utm_source=share"),
            "https://l/posts/x-activity-1"
        );
        assert_eq!(normalize_post_link("https://l/posts/x-activity-1//"), "https://l/posts/x-activity-1");
        assert_eq!(normalize_post_link("https://l/posts/x-activity-1"), "https://l/posts/x-activity-1");
    }

    #[test]
    fn test_mark_matches_modulo_decoration() {
        let mark = HighWaterMark::new("https://l/posts/x-activity-1/?utm_source=share");
        assert!(mark.matches("https://l/posts/x-activity-1"));
        assert!(mark.matches("https://l/posts/x-activity-1/"));
        assert!(!mark.matches("https://l/posts/x-activity-2"));
    }

    #[tokio::test]
    async fn test_read_mark_from_feed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master-concept.xml");
        tokio::fs::write(&path, FEED).await.unwrap();

        let mark = read_high_water_mark(&path).await.unwrap();
        assert_eq!(
            mark.as_str(),
            "https://www.linkedin.com/posts/master-concept_a-activity-222"
        );
    }

    #[tokio::test]
    async fn test_read_mark_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_high_water_mark(&dir.path().join("absent.xml")).await.is_none());
    }

    #[tokio::test]
    async fn test_read_mark_malformed_feed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xml");
        tokio::fs::write(&path, "<rss><channel><item>").await.unwrap();

        assert!(read_high_water_mark(&path).await.is_none());
    }

    #[tokio::test]
    async fn test_read_mark_skips_linkless_item() {
        let xml = r#"<rss version="2.0"><channel>
            <item><title>no link</title></item>
            <item><link>https://l/posts/found-activity-9</link></item>
        </channel></rss>"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.xml");
        tokio::fs::write(&path, xml).await.unwrap();

        let mark = read_high_water_mark(&path).await.unwrap();
        assert_eq!(mark.as_str(), "https://l/posts/found-activity-9");
    }
}
