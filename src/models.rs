//! Data models for harvested posts and their persisted representations.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Post`]: A single harvested post in its persisted wire shape
//! - [`PageFeed`]: The wrapper record stored per page (name, slug, sync stamp, posts)
//! - [`StoredPosts`]: Reader for both the wrapper record and the legacy bare-list shape
//!
//! It also hosts [`merge_posts`], the pure merge that combines a run's new
//! posts with previously persisted ones.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// A single post harvested from a LinkedIn page.
///
/// The field names match the persisted JSON shape, which older deployments
/// already have on disk, so they must not change.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Post {
    /// Short title derived from the post body (truncated to 100 characters).
    pub title: String,
    /// Permanent URL of the post; the deduplication identity.
    pub link: String,
    /// Full post body text, or a sentinel when the post has no text.
    pub description: String,
    /// Publication time as an ISO-8601 string (UTC when decoded from the
    /// activity token).
    pub published: String,
    /// Media CDN image URLs attached to the post, in page order.
    #[serde(default)]
    pub images: Vec<String>,
    /// When this post was harvested, ISO-8601.
    #[serde(default)]
    pub scraped_at: String,
}

impl Post {
    /// First attached image, if any. Feeds embed and enclose only this one.
    pub fn first_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}

/// The per-page record persisted to disk.
///
/// One file per slug holds the page's display name, its slug, the time of
/// the last successful sync, and every post harvested so far (newest first).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PageFeed {
    /// Human-readable page name, as rendered on the page itself.
    pub page_name: String,
    /// The page slug; also the basename of the persisted files.
    pub slug: String,
    /// Timestamp of the last successful sync, ISO-8601.
    pub updated_at: String,
    /// All posts known for this page, newest first.
    pub posts: Vec<Post>,
}

/// Both shapes a posts file can have on disk.
///
/// Early deployments persisted a bare post array; current ones persist the
/// [`PageFeed`] wrapper. Reads must accept either.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum StoredPosts {
    /// Current shape: wrapper record with page metadata.
    Wrapped(PageFeed),
    /// Legacy shape: a bare list of posts.
    Legacy(Vec<Post>),
}

impl StoredPosts {
    /// The post list, regardless of which shape was on disk.
    pub fn into_posts(self) -> Vec<Post> {
        match self {
            StoredPosts::Wrapped(feed) => feed.posts,
            StoredPosts::Legacy(posts) => posts,
        }
    }

    /// The stored page name, when the wrapper shape carried one.
    pub fn page_name(&self) -> Option<&str> {
        match self {
            StoredPosts::Wrapped(feed) => Some(&feed.page_name),
            StoredPosts::Legacy(_) => None,
        }
    }

    /// The last sync stamp, when the wrapper shape carried one.
    pub fn updated_at(&self) -> Option<&str> {
        match self {
            StoredPosts::Wrapped(feed) => Some(&feed.updated_at),
            StoredPosts::Legacy(_) => None,
        }
    }
}

/// Merge a run's new posts with the previously persisted ones.
///
/// New posts come first (they are newest), followed by every existing post
/// whose link does not appear among the new ones. Order within each group is
/// preserved and no re-sort happens here; feed emission sorts by published
/// date at render time.
///
/// # Arguments
///
/// * `new_posts` - Posts harvested this run, newest first
/// * `existing` - Posts already on disk, newest first
///
/// # Returns
///
/// The combined list with each link appearing exactly once.
pub fn merge_posts(new_posts: Vec<Post>, existing: Vec<Post>) -> Vec<Post> {
    new_posts
        .into_iter()
        .chain(existing)
        .unique_by(|post| post.link.clone())
        .collect()
}
