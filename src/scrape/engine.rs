//! Harvest loop over a rendered feed.
//!
//! Interleaves reading the rendered post snapshot with scrolling for more,
//! turning raw outer HTML into [`Post`] values until a stop condition
//! fires. Which conditions apply depends on the run mode: a first run for a
//! page has no previously published post to stop at and takes a small
//! starter batch instead; every later run walks new posts until it sees the
//! newest link already in the feed.

use crate::browser::PostSource;
use crate::models::Post;
use crate::scrape::boundary::{normalize_post_link, HighWaterMark};
use crate::scrape::extract::{post_body, post_images, post_title};
use crate::scrape::resolve::{resolve_identity, resolve_published};
use chrono::Local;
use scraper::Html;
use std::collections::HashSet;
use std::error::Error;
use tracing::{debug, info, instrument, warn};

/// Hard cap on posts collected in a single run, any mode.
pub const MAX_POSTS_PER_RUN: usize = 100;

/// Scroll budget while walking back to the last published post.
const CATCH_UP_SCROLL_BUDGET: usize = 20;
/// Scroll budget for a first run; the starter batch is small, so a few
/// screens suffice.
const BOOTSTRAP_SCROLL_BUDGET: usize = 5;

/// What kind of run this is, decided by whether the page already has a
/// published feed to catch up to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// No feed yet; collect a starter batch of the newest posts.
    Bootstrap,
    /// Feed exists; collect everything newer than its newest item.
    CatchUp,
}

impl RunMode {
    fn scroll_budget(self) -> usize {
        match self {
            RunMode::Bootstrap => BOOTSTRAP_SCROLL_BUDGET,
            RunMode::CatchUp => CATCH_UP_SCROLL_BUDGET,
        }
    }
}

/// Why the harvest loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Reached the newest already-published post; everything before it was
    /// collected, the matching post itself was not.
    BoundaryReached,
    /// Hit [`MAX_POSTS_PER_RUN`].
    PostCap,
    /// First-run starter batch is full.
    BootstrapQuota,
    /// Used the whole scroll budget without another stop firing.
    FetchExhausted,
}

/// Inputs for one page's harvest.
#[derive(Debug, Clone)]
pub struct ScrapeContext {
    /// Page slug, used to recognize the page's own post permalinks.
    pub slug: String,
    /// Newest already-published link, when the page has a feed.
    pub mark: Option<HighWaterMark>,
    /// Starter batch size for a page without a feed.
    pub max_posts_initial: usize,
}

/// Result of one page's harvest.
#[derive(Debug)]
pub struct ScrapeOutcome {
    /// Collected posts, newest first as rendered.
    pub posts: Vec<Post>,
    pub stop: StopReason,
    /// Rendered items that yielded no usable permalink.
    pub skipped: usize,
}

/// Harvest posts from an open page until a stop condition fires.
///
/// An empty first snapshot means the page did not render a feed at all
/// (auth wall, dead page, renderer failure) and is an error; the caller
/// must not touch the page's published state in that case.
#[instrument(level = "info", skip_all, fields(slug = %ctx.slug))]
pub async fn scrape_page<S: PostSource>(
    source: &mut S,
    ctx: &ScrapeContext,
) -> Result<ScrapeOutcome, Box<dyn Error>> {
    let mode = if ctx.mark.is_some() { RunMode::CatchUp } else { RunMode::Bootstrap };
    let budget = mode.scroll_budget();
    info!(?mode, scroll_budget = budget, "Starting harvest");

    let mut handles = source.posts().await?;
    if handles.is_empty() {
        return Err(format!(
            "page for '{}' rendered no posts; the feed was not reached",
            ctx.slug
        )
        .into());
    }

    let mut posts: Vec<Post> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut skipped = 0usize;
    let mut processed = 0usize;
    let mut scrolls = 0usize;

    let stop = 'harvest: loop {
        while processed < handles.len() {
            let raw = &handles[processed];
            processed += 1;

            let fragment = Html::parse_fragment(&raw.html);
            let Some(identity) = resolve_identity(&raw.html, &fragment, &ctx.slug) else {
                skipped += 1;
                warn!(item = processed, "No permalink found in rendered item; skipping");
                continue;
            };

            if let Some(mark) = &ctx.mark {
                if mark.matches(&identity.link) {
                    info!(link = %identity.link, "Reached newest already-published post");
                    break 'harvest StopReason::BoundaryReached;
                }
            }

            if !seen.insert(normalize_post_link(&identity.link)) {
                debug!(link = %identity.link, "Duplicate rendered item; skipping");
                continue;
            }

            let published = resolve_published(&fragment, identity.token.as_deref());
            let body = post_body(&fragment);
            let post = Post {
                title: post_title(&body),
                link: identity.link,
                description: body,
                published,
                images: post_images(&fragment),
                scraped_at: Local::now().to_rfc3339(),
            };
            debug!(link = %post.link, title = %post.title, "Collected post");
            posts.push(post);

            if posts.len() >= MAX_POSTS_PER_RUN {
                break 'harvest StopReason::PostCap;
            }
            if mode == RunMode::Bootstrap && posts.len() >= ctx.max_posts_initial {
                break 'harvest StopReason::BootstrapQuota;
            }
        }

        if scrolls >= budget {
            break StopReason::FetchExhausted;
        }
        scrolls += 1;
        source.load_more().await?;

        let refreshed = source.posts().await?;
        if refreshed.len() <= handles.len() {
            debug!(scrolls, "No new posts after this scroll");
        }
        handles = refreshed;
    };

    if mode == RunMode::CatchUp && stop == StopReason::FetchExhausted {
        warn!(
            collected = posts.len(),
            "Stopped before reaching the last published post; older posts may be missing"
        );
    }
    info!(collected = posts.len(), skipped, ?stop, scrolls, "Harvest finished");

    Ok(ScrapeOutcome { posts, stop, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::RawPost;
    use crate::scrape::extract::PLACEHOLDER_NO_TEXT;

    /// Post source that replays a scripted series of page snapshots. Each
    /// scroll advances to the next snapshot; the last one then repeats.
    struct FakeSource {
        snapshots: Vec<Vec<RawPost>>,
        cursor: usize,
        scrolls: usize,
    }

    impl FakeSource {
        fn new(snapshots: Vec<Vec<RawPost>>) -> Self {
            FakeSource { snapshots, cursor: 0, scrolls: 0 }
        }
    }

    impl PostSource for FakeSource {
        async fn page_name(&mut self) -> Option<String> {
            Some("Acme Robotics".to_string())
        }

        async fn posts(&mut self) -> Result<Vec<RawPost>, Box<dyn Error>> {
            Ok(self.snapshots[self.cursor].clone())
        }

        async fn load_more(&mut self) -> Result<(), Box<dyn Error>> {
            self.scrolls += 1;
            if self.cursor + 1 < self.snapshots.len() {
                self.cursor += 1;
            }
            Ok(())
        }
    }

    fn item(n: u64) -> RawPost {
        RawPost {
            html: format!(
                "<div data-urn=\"urn:li:activity:7{n:04}\">\
                 <a href=\"https://www.linkedin.com/posts/acme_update-activity-7{n:04}\">view</a>\
                 <div class=\"break-words\">Post number {n} with enough body text to keep.</div>\
                 </div>"
            ),
        }
    }

    fn link_of(n: u64) -> String {
        format!("https://www.linkedin.com/posts/acme_update-activity-7{n:04}")
    }

    fn items(range: std::ops::Range<u64>) -> Vec<RawPost> {
        range.map(item).collect()
    }

    fn ctx(mark: Option<&str>) -> ScrapeContext {
        ScrapeContext {
            slug: "acme".to_string(),
            mark: mark.map(HighWaterMark::new),
            max_posts_initial: 10,
        }
    }

    #[tokio::test]
    async fn test_bootstrap_stops_at_starter_quota() {
        let mut source = FakeSource::new(vec![items(0..15)]);
        let outcome = scrape_page(&mut source, &ctx(None)).await.unwrap();

        assert_eq!(outcome.stop, StopReason::BootstrapQuota);
        assert_eq!(outcome.posts.len(), 10);
        assert_eq!(outcome.posts[0].link, link_of(0));
        assert_eq!(source.scrolls, 0);
    }

    #[tokio::test]
    async fn test_bootstrap_spends_its_whole_scroll_budget() {
        let mut source = FakeSource::new(vec![items(0..3), items(0..7)]);
        let outcome = scrape_page(&mut source, &ctx(None)).await.unwrap();

        assert_eq!(outcome.stop, StopReason::FetchExhausted);
        assert_eq!(outcome.posts.len(), 7);
        // Reads that grow nothing do not end the run; only the budget does.
        assert_eq!(source.scrolls, BOOTSTRAP_SCROLL_BUDGET);
    }

    #[tokio::test]
    async fn test_catch_up_stops_at_known_post_and_excludes_it() {
        let mut source = FakeSource::new(vec![items(0..5)]);
        let mark = link_of(2);
        let outcome = scrape_page(&mut source, &ctx(Some(&mark))).await.unwrap();

        assert_eq!(outcome.stop, StopReason::BoundaryReached);
        let links: Vec<_> = outcome.posts.iter().map(|p| p.link.clone()).collect();
        assert_eq!(links, vec![link_of(0), link_of(1)]);
    }

    #[tokio::test]
    async fn test_catch_up_boundary_matches_despite_query_string() {
        let mut source = FakeSource::new(vec![items(0..4)]);
        let mark = format!("{}?utm_source=share", link_of(1));
        let outcome = scrape_page(&mut source, &ctx(Some(&mark))).await.unwrap();

        assert_eq!(outcome.stop, StopReason::BoundaryReached);
        assert_eq!(outcome.posts.len(), 1);
    }

    #[tokio::test]
    async fn test_catch_up_finds_boundary_after_scrolling() {
        let mut source = FakeSource::new(vec![items(0..2), items(0..6)]);
        let mark = link_of(4);
        let outcome = scrape_page(&mut source, &ctx(Some(&mark))).await.unwrap();

        assert_eq!(outcome.stop, StopReason::BoundaryReached);
        assert_eq!(outcome.posts.len(), 4);
        assert_eq!(source.scrolls, 1);
    }

    #[tokio::test]
    async fn test_catch_up_scrolls_through_a_render_stall() {
        // The second read returns the same two items before the feed grows
        // again; the run must keep scrolling to the boundary, not give up.
        let mut source = FakeSource::new(vec![items(0..2), items(0..2), items(0..6)]);
        let mark = link_of(4);
        let outcome = scrape_page(&mut source, &ctx(Some(&mark))).await.unwrap();

        assert_eq!(outcome.stop, StopReason::BoundaryReached);
        let links: Vec<_> = outcome.posts.iter().map(|p| p.link.clone()).collect();
        assert_eq!(links, vec![link_of(0), link_of(1), link_of(2), link_of(3)]);
        assert_eq!(source.scrolls, 2);
    }

    #[tokio::test]
    async fn test_post_cap_wins_over_starter_quota() {
        let mut source = FakeSource::new(vec![items(0..120)]);
        let mut context = ctx(None);
        context.max_posts_initial = 150;
        let outcome = scrape_page(&mut source, &context).await.unwrap();

        assert_eq!(outcome.stop, StopReason::PostCap);
        assert_eq!(outcome.posts.len(), MAX_POSTS_PER_RUN);
    }

    #[tokio::test]
    async fn test_catch_up_post_cap() {
        let mut source = FakeSource::new(vec![items(0..120)]);
        let mark = link_of(9999);
        let outcome = scrape_page(&mut source, &ctx(Some(&mark))).await.unwrap();

        assert_eq!(outcome.stop, StopReason::PostCap);
        assert_eq!(outcome.posts.len(), MAX_POSTS_PER_RUN);
    }

    #[tokio::test]
    async fn test_empty_first_snapshot_is_an_error() {
        let mut source = FakeSource::new(vec![vec![]]);
        let err = scrape_page(&mut source, &ctx(None)).await.unwrap_err();
        assert!(err.to_string().contains("rendered no posts"));
    }

    #[tokio::test]
    async fn test_items_without_permalinks_are_skipped_and_counted() {
        let mut snapshot = items(0..3);
        snapshot.insert(1, RawPost { html: "<div class=\"break-words\">no link here</div>".into() });
        let mut source = FakeSource::new(vec![snapshot]);

        let outcome = scrape_page(&mut source, &ctx(None)).await.unwrap();
        assert_eq!(outcome.posts.len(), 3);
        assert_eq!(outcome.skipped, 1);
    }

    #[tokio::test]
    async fn test_repeated_items_across_snapshots_collected_once() {
        let mut second = items(0..2);
        second.push(item(0));
        second.push(item(2));
        let mut source = FakeSource::new(vec![items(0..2), second]);

        let outcome = scrape_page(&mut source, &ctx(None)).await.unwrap();
        let links: Vec<_> = outcome.posts.iter().map(|p| p.link.clone()).collect();
        assert_eq!(links, vec![link_of(0), link_of(1), link_of(2)]);
    }

    #[tokio::test]
    async fn test_sentinel_bodied_post_is_still_collected() {
        let snapshot = vec![RawPost {
            html: "<div data-urn=\"urn:li:activity:70042\">\
                   <a href=\"https://www.linkedin.com/posts/acme_update-activity-70042\">view</a>\
                   <div class=\"break-words\">Hi</div>\
                   </div>"
                .to_string(),
        }];
        let mut source = FakeSource::new(vec![snapshot]);

        let outcome = scrape_page(&mut source, &ctx(None)).await.unwrap();
        assert_eq!(outcome.posts.len(), 1);
        assert_eq!(outcome.skipped, 0);
        assert_eq!(outcome.posts[0].description, PLACEHOLDER_NO_TEXT);
        assert_eq!(outcome.posts[0].title, PLACEHOLDER_NO_TEXT);
        assert_eq!(outcome.posts[0].link, link_of(42));
    }

    #[tokio::test]
    async fn test_collected_posts_carry_extracted_fields() {
        let mut source = FakeSource::new(vec![items(0..1)]);
        let outcome = scrape_page(&mut source, &ctx(None)).await.unwrap();

        let post = &outcome.posts[0];
        assert_eq!(post.description, "Post number 0 with enough body text to keep.");
        assert_eq!(post.title, post.description);
        assert!(!post.published.is_empty());
        assert!(!post.scraped_at.is_empty());
    }
}
