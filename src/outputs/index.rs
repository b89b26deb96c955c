//! Overview page generation.
//!
//! Builds a static `index.html` one directory above the feeds, linking
//! every configured page's feed and listing the most recent posts across
//! all of them. Regenerated after each batch run, so it always reflects
//! the state on disk, including pages that were skipped or failed this
//! time around.

use crate::config::PagesConfig;
use crate::models::Post;
use crate::outputs::json::{load_page_state, PageState};
use crate::outputs::rss::{channel_link, parse_published, HKT};
use crate::utils::display_name_from_slug;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::cmp::Reverse;
use std::error::Error;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

/// How many posts the "Latest posts" section shows.
const LATEST_LIMIT: usize = 10;
/// How many stored-state files are read at once.
const LOAD_CONCURRENCY: usize = 4;

struct FeedSummary {
    name: String,
    slug: String,
    posts: usize,
    updated_at: Option<String>,
    active: bool,
}

/// Regenerate the overview page from the configured pages' stored state.
#[instrument(level = "info", skip_all, fields(feed_dir = %feed_dir))]
pub async fn write_index(config: &PagesConfig, feed_dir: &str) -> Result<(), Box<dyn Error>> {
    let states: Vec<(String, bool, PageState)> = stream::iter(config.pages.iter())
        .map(|page| {
            let slug = page.slug();
            let active = page.is_active();
            async move { (slug.clone(), active, load_page_state(feed_dir, &slug).await) }
        })
        .buffered(LOAD_CONCURRENCY)
        .collect()
        .await;

    let mut summaries = Vec::new();
    let mut latest: Vec<(String, Post)> = Vec::new();

    for (slug, active, state) in states {
        let name = state
            .page_name
            .clone()
            .unwrap_or_else(|| display_name_from_slug(&slug));

        for post in state.posts.iter().take(LATEST_LIMIT) {
            latest.push((name.clone(), post.clone()));
        }
        summaries.push(FeedSummary {
            name,
            slug,
            posts: state.posts.len(),
            updated_at: state.updated_at,
            active,
        });
    }

    latest.sort_by_key(|(_, post)| {
        Reverse(parse_published(&post.published).unwrap_or(DateTime::UNIX_EPOCH))
    });
    latest.truncate(LATEST_LIMIT);

    let feed_base = Path::new(feed_dir)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| feed_dir.to_string());
    let html = render_index(&summaries, &latest, &feed_base);

    let path = index_path(feed_dir);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    fs::write(&path, html).await?;
    info!(path = %path.display(), feeds = summaries.len(), "Wrote overview page");
    Ok(())
}

/// The overview page lives one level above the feed files.
pub fn index_path(feed_dir: &str) -> PathBuf {
    let parent = Path::new(feed_dir)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    parent.join("index.html")
}

fn render_index(summaries: &[FeedSummary], latest: &[(String, Post)], feed_base: &str) -> String {
    let now_hkt = Utc::now().with_timezone(&*HKT);
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\"/>\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"/>\n");
    html.push_str("<title>LinkedIn RSS Feeds</title>\n");
    html.push_str(
        "<style>\n\
         body { font-family: -apple-system, 'Segoe UI', Helvetica, Arial, sans-serif; margin: 0; background: #f3f2ef; color: #1d2226; }\n\
         header { background: #0a66c2; color: #fff; padding: 24px 32px; }\n\
         header h1 { margin: 0; font-size: 1.6em; }\n\
         header p { margin: 6px 0 0; opacity: 0.85; }\n\
         main { max-width: 960px; margin: 24px auto; padding: 0 16px; }\n\
         .cards { display: grid; grid-template-columns: repeat(auto-fill, minmax(280px, 1fr)); gap: 16px; }\n\
         .card { background: #fff; border-radius: 8px; padding: 16px; box-shadow: 0 1px 3px rgba(0,0,0,0.15); }\n\
         .card h2 { margin: 0 0 8px; font-size: 1.1em; }\n\
         .card .meta { color: #56687a; font-size: 0.85em; margin-bottom: 12px; }\n\
         .card a { color: #0a66c2; text-decoration: none; margin-right: 12px; }\n\
         .badge { background: #e9a200; color: #fff; border-radius: 4px; padding: 1px 6px; font-size: 0.75em; vertical-align: middle; }\n\
         .latest { background: #fff; border-radius: 8px; padding: 16px; margin-top: 24px; box-shadow: 0 1px 3px rgba(0,0,0,0.15); }\n\
         .latest li { margin-bottom: 8px; }\n\
         .latest .source { color: #56687a; font-size: 0.85em; }\n\
         footer { text-align: center; color: #56687a; font-size: 0.8em; margin: 24px 0; }\n\
         </style>\n</head>\n<body>\n",
    );

    let total_posts: usize = summaries.iter().map(|summary| summary.posts).sum();
    writeln!(html, "<header>\n<h1>LinkedIn RSS Feeds</h1>").unwrap();
    writeln!(
        html,
        "<p>{} page{} tracked &middot; {} post{} archived</p>\n</header>",
        summaries.len(),
        if summaries.len() == 1 { "" } else { "s" },
        total_posts,
        if total_posts == 1 { "" } else { "s" }
    )
    .unwrap();

    html.push_str("<main>\n<div class=\"cards\">\n");
    for summary in summaries {
        writeln!(html, "<div class=\"card\">").unwrap();
        write!(html, "<h2>{}", escape(&summary.name)).unwrap();
        if !summary.active {
            html.push_str(" <span class=\"badge\">paused</span>");
        }
        html.push_str("</h2>\n");

        let updated = summary
            .updated_at
            .as_deref()
            .and_then(parse_published)
            .map(|dt| dt.with_timezone(&*HKT).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        writeln!(
            html,
            "<div class=\"meta\">{} post{} &middot; updated {}</div>",
            summary.posts,
            if summary.posts == 1 { "" } else { "s" },
            updated
        )
        .unwrap();

        writeln!(
            html,
            "<a href=\"{}/{}.xml\">RSS feed</a><a href=\"{}\">LinkedIn page</a>",
            escape(feed_base),
            escape(&summary.slug),
            escape(&channel_link(&summary.slug))
        )
        .unwrap();
        html.push_str("</div>\n");
    }
    html.push_str("</div>\n");

    if !latest.is_empty() {
        html.push_str("<div class=\"latest\">\n<h2>Latest posts</h2>\n<ul>\n");
        for (name, post) in latest {
            let date = parse_published(&post.published)
                .map(|dt| dt.with_timezone(&*HKT).format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            writeln!(
                html,
                "<li><a href=\"{}\">{}</a> <span class=\"source\">{} {}</span></li>",
                escape(&post.link),
                escape(&post.title),
                escape(name),
                date
            )
            .unwrap();
        }
        html.push_str("</ul>\n</div>\n");
    }

    writeln!(
        html,
        "</main>\n<footer>Generated {}</footer>\n</body>\n</html>",
        now_hkt.format("%Y-%m-%d %I:%M %p HKT")
    )
    .unwrap();
    html
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PageEntry, PageStatus};
    use crate::models::PageFeed;
    use crate::outputs::json::save_page_feed;

    fn entry(url: &str, status: PageStatus) -> PageEntry {
        PageEntry { url: url.to_string(), status }
    }

    #[tokio::test]
    async fn test_write_index_lists_feeds_and_latest_posts() {
        let dir = tempfile::tempdir().unwrap();
        let feed_dir = dir.path().join("feed");
        let feed_dir = feed_dir.to_str().unwrap();

        let feed = PageFeed {
            page_name: "Acme R&D".to_string(),
            slug: "acme-robotics".to_string(),
            updated_at: "2024-05-02T09:00:00+00:00".to_string(),
            posts: vec![Post {
                title: "Shipping <fast>".to_string(),
                link: "https://www.linkedin.com/posts/acme-robotics_a-activity-1".to_string(),
                description: "Shipping <fast>".to_string(),
                published: "2024-05-01T08:00:00+00:00".to_string(),
                images: vec![],
                scraped_at: String::new(),
            }],
        };
        save_page_feed(&feed, feed_dir).await.unwrap();

        let config = PagesConfig {
            pages: vec![
                entry("https://www.linkedin.com/company/acme-robotics/", PageStatus::Active),
                entry("https://www.linkedin.com/company/beta-corp/", PageStatus::Paused),
            ],
        };
        write_index(&config, feed_dir).await.unwrap();

        let html = std::fs::read_to_string(dir.path().join("index.html")).unwrap();
        assert!(html.contains("Acme R&amp;D"));
        assert!(html.contains("feed/acme-robotics.xml"));
        assert!(html.contains("Shipping &lt;fast&gt;"));
        // The page without stored posts falls back to a name from its slug.
        assert!(html.contains("Beta Corp"));
        assert!(html.contains("paused"));
    }

    #[tokio::test]
    async fn test_index_latest_posts_capped_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let feed_dir = dir.path().join("feed");
        let feed_dir = feed_dir.to_str().unwrap();

        let posts: Vec<Post> = (0..15)
            .map(|i| Post {
                title: format!("post {i}"),
                link: format!("https://l/p{i}"),
                description: format!("post {i}"),
                published: format!("2024-05-{:02}T00:00:00+00:00", i + 1),
                images: vec![],
                scraped_at: String::new(),
            })
            .rev()
            .collect();
        let feed = PageFeed {
            page_name: "Acme".to_string(),
            slug: "acme".to_string(),
            updated_at: "2024-05-16T00:00:00+00:00".to_string(),
            posts,
        };
        save_page_feed(&feed, feed_dir).await.unwrap();

        let config = PagesConfig {
            pages: vec![entry("https://www.linkedin.com/company/acme/", PageStatus::Active)],
        };
        write_index(&config, feed_dir).await.unwrap();

        let html = std::fs::read_to_string(dir.path().join("index.html")).unwrap();
        assert_eq!(html.matches("<li>").count(), LATEST_LIMIT);
        assert!(html.contains("post 14"));
        assert!(!html.contains("post 4<"));
    }

    #[test]
    fn test_index_path_is_one_level_up() {
        assert_eq!(index_path("www/feeds"), PathBuf::from("www/index.html"));
        assert_eq!(index_path("feed"), PathBuf::from("./index.html"));
    }
}
