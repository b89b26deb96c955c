//! Utility functions for URL handling, naming, and file system operations.
//!
//! This module provides helper functions used throughout the application:
//! - Slug extraction and URL normalization for LinkedIn page addresses
//! - Display-name fallback derivation from slugs
//! - String truncation for logging
//! - File system validation for output directories

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

/// Query parameters that pin the posts view to "all posts, newest first".
pub const FEED_VIEW_PARAMS: &str = "feedView=all&sortBy=recent&viewAsMember=true";

static COMPANY_SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/company/([^/?#]+)").unwrap());
static SHOWCASE_SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/showcase/([^/?#]+)").unwrap());

/// Extract the page slug from a LinkedIn URL.
///
/// Company pages (`/company/<slug>`) and showcase pages (`/showcase/<slug>`)
/// are both recognized. URLs that match neither pattern fall back to the
/// generic slug `linkedin-feed` so output filenames stay predictable.
///
/// # Arguments
///
/// * `url` - Any LinkedIn page URL, with or without a `/posts/` suffix
///
/// # Returns
///
/// The slug portion of the URL, or `"linkedin-feed"`.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(slug_from_url("https://www.linkedin.com/company/master-concept/"), "master-concept");
/// assert_eq!(slug_from_url("https://www.linkedin.com/showcase/acme-cloud/posts/"), "acme-cloud");
/// ```
pub fn slug_from_url(url: &str) -> String {
    for re in [&*COMPANY_SLUG_RE, &*SHOWCASE_SLUG_RE] {
        if let Some(caps) = re.captures(url) {
            return caps[1].to_string();
        }
    }
    "linkedin-feed".to_string()
}

/// Normalize a LinkedIn page URL into its posts view.
///
/// Ensures the URL points at the `/posts/` page and carries the query
/// parameters that request all posts sorted newest-first. URLs that already
/// contain a posts path keep it; existing query strings are extended rather
/// than replaced.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(
///     normalize_page_url("https://www.linkedin.com/company/master-concept/"),
///     "https://www.linkedin.com/company/master-concept/posts/?feedView=all&sortBy=recent&viewAsMember=true"
/// );
/// ```
pub fn normalize_page_url(url: &str) -> String {
    let mut url = url.trim_end_matches('/').to_string();
    if !url.contains("/posts") {
        url.push_str("/posts/");
    }
    if !url.contains('?') {
        url.push('?');
        url.push_str(FEED_VIEW_PARAMS);
    } else if !url.contains("feedView") {
        url.push('&');
        url.push_str(FEED_VIEW_PARAMS);
    }
    url
}

/// Derive a human-readable page name from a slug.
///
/// Used when the rendered page exposes no usable title element, so feeds
/// still carry a presentable channel name.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(display_name_from_slug("master-concept"), "Master Concept");
/// ```
pub fn display_name_from_slug(slug: &str) -> String {
    slug.split('-')
        .filter(|part| !part.is_empty())
        .map(upcase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Capitalize the first character of a string.
///
/// # Arguments
///
/// * `s` - The string to capitalize
///
/// # Returns
///
/// The string with its first character converted to uppercase.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(upcase("hello"), "Hello");
/// assert_eq!(upcase(""), "");
/// ```
pub fn upcase(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to at most `max` bytes (cut on a character
/// boundary, since post markup is routinely multi-byte) with an ellipsis and
/// byte count indicator appended.
///
/// # Arguments
///
/// * `s` - The string to potentially truncate
/// * `max` - Maximum number of bytes to keep
///
/// # Returns
///
/// The original string if shorter than `max`, otherwise a truncated version
/// with `"…(+N bytes)"` appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Ensure a directory exists and is writable.
///
/// This function creates the directory if it doesn't exist, then performs
/// a write test by creating and immediately deleting a probe file.
///
/// # Arguments
///
/// * `path` - The directory path to validate
///
/// # Returns
///
/// `Ok(())` if the directory exists and is writable, or an error describing
/// the failure.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    if let Err(e) = fs::create_dir_all(path).await {
        return Err(Box::new(e));
    }
    // Try a small sync write using std fs (simpler error surface)
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
