//! Post body, title, and image extraction.
//!
//! LinkedIn markup varies by post kind (plain text, article share, video,
//! reshare), so extraction walks ordered selector chains and takes the first
//! usable hit. Posts with no recoverable text still produce a post; a
//! placeholder body keeps the persisted shape uniform.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

/// Body used when an item exposes no text at all.
pub const PLACEHOLDER_NO_DESCRIPTION: &str = "[Post without text description]";

/// Body used when the extracted text is too short to stand on its own.
pub const PLACEHOLDER_NO_TEXT: &str = "[Post without text]";

/// Body candidates, most specific first. Only the first element matching
/// each selector is consulted.
static TEXT_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        ".feed-shared-text",
        ".break-words",
        "[dir='ltr']",
        ".attributed-text-segment-list__content",
        ".update-components-text",
        ".feed-shared-update-v2__description-wrapper",
        ".feed-shared-inline-show-more-text",
    ]
    .iter()
    .map(|s| Selector::parse(s).unwrap())
    .collect()
});

/// Image candidates, most specific first. The first selector whose filtered
/// result is non-empty wins.
static IMAGE_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        "img.feed-shared-image__image",
        "img[class*='ivm-view-attr__img']",
        ".feed-shared-update-v2__content img",
        "article img",
    ]
    .iter()
    .map(|s| Selector::parse(s).unwrap())
    .collect()
});

/// Extract the post body from a raw item fragment.
///
/// Walks [`TEXT_SELECTORS`] taking the first non-empty text, falls back to
/// the item's full visible text, and substitutes placeholders when even that
/// is too short. The result is never empty.
pub fn post_body(fragment: &Html) -> String {
    let mut body = String::new();

    for selector in TEXT_SELECTORS.iter() {
        if let Some(element) = fragment.select(selector).next() {
            let text = normalized_text(element);
            if !text.is_empty() {
                body = text;
                break;
            }
        }
    }

    if body.is_empty() {
        body = normalized_text(fragment.root_element());
        if body.chars().count() < 10 {
            body = PLACEHOLDER_NO_DESCRIPTION.to_string();
        }
    }

    // A couple of characters is not a usable body either.
    if body.chars().count() < 5 {
        body = PLACEHOLDER_NO_TEXT.to_string();
    }

    body
}

/// Derive the feed item title from an already extracted body.
///
/// Bodies longer than 100 characters are cut at the 100th character with an
/// ellipsis appended; shorter ones are used verbatim.
pub fn post_title(body: &str) -> String {
    if body.chars().count() > 100 {
        let head: String = body.chars().take(100).collect();
        format!("{head}...")
    } else {
        body.to_string()
    }
}

/// Extract content image URLs from a raw item fragment.
///
/// Walks [`IMAGE_SELECTORS`] and returns the candidates of the first
/// selector that yields any image surviving the filters: only media CDN
/// URLs count, and company logos and profile pictures are dropped. Order is
/// preserved and exact duplicates are removed.
pub fn post_images(fragment: &Html) -> Vec<String> {
    for selector in IMAGE_SELECTORS.iter() {
        let mut images: Vec<String> = Vec::new();
        for img in fragment.select(selector) {
            let Some(src) = img.value().attr("src") else {
                continue;
            };
            if !src.contains("media.licdn.com/dms/image") {
                continue;
            }
            if src.contains("company-logo_100_100") || src.contains("profile-") {
                continue;
            }
            if !images.iter().any(|existing| existing == src) {
                images.push(src.to_string());
            }
        }
        if !images.is_empty() {
            return images;
        }
    }
    Vec::new()
}

/// Visible text of an element with whitespace collapsed.
fn normalized_text(element: ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
