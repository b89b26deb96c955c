//! Page state persistence.
//!
//! Each page's collected posts live in one JSON file next to its feed:
//!
//! ```text
//! feed/
//! ├── acme-robotics_posts.json
//! └── acme-robotics.xml
//! ```
//!
//! The JSON file is the durable record; the feed XML is regenerated from
//! it on every run. Loading tolerates both the current wrapped shape
//! (page metadata plus posts) and the bare post array older versions
//! wrote.

use crate::models::{PageFeed, Post, StoredPosts};
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Path of the posts JSON for a page.
pub fn posts_path(feed_dir: &str, slug: &str) -> PathBuf {
    Path::new(feed_dir).join(format!("{slug}_posts.json"))
}

/// What was on disk for a page, in whichever shape it was written.
#[derive(Debug, Default)]
pub struct PageState {
    pub posts: Vec<Post>,
    pub page_name: Option<String>,
    pub updated_at: Option<String>,
}

/// Load a page's stored posts and metadata.
///
/// A missing file means the page has never been collected and yields an
/// empty state. An unreadable or unparseable file is treated the same way
/// after a warning; the next successful run rewrites it.
#[instrument(level = "info", skip_all, fields(slug = %slug))]
pub async fn load_page_state(feed_dir: &str, slug: &str) -> PageState {
    let path = posts_path(feed_dir, slug);

    let raw = match fs::read_to_string(&path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No stored posts yet");
            return PageState::default();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read stored posts; starting empty");
            return PageState::default();
        }
    };

    match serde_json::from_str::<StoredPosts>(&raw) {
        Ok(stored) => {
            let page_name = stored.page_name().map(str::to_string);
            let updated_at = stored.updated_at().map(str::to_string);
            let posts = stored.into_posts();
            info!(count = posts.len(), "Loaded stored posts");
            PageState { posts, page_name, updated_at }
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Stored posts did not parse; starting empty");
            PageState::default()
        }
    }
}

/// Write a page's posts JSON.
///
/// The file is replaced atomically so a crash mid-write can never leave a
/// half-written state file behind.
#[instrument(level = "info", skip_all, fields(slug = %feed.slug))]
pub async fn save_page_feed(feed: &PageFeed, feed_dir: &str) -> Result<(), Box<dyn Error>> {
    let path = posts_path(feed_dir, &feed.slug);
    let json = serde_json::to_string_pretty(feed)?;

    fs::create_dir_all(feed_dir).await?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).await?;
    fs::rename(&tmp, &path).await?;

    info!(path = %path.display(), posts = feed.posts.len(), "Wrote posts JSON");
    Ok(())
}
