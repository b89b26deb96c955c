//! Post identity and timestamp resolution.
//!
//! Every raw feed item must be pinned to a stable permanent link before it
//! can be deduplicated or compared against the previous run's newest post.
//! LinkedIn renders that link in several inconsistent ways, so resolution
//! walks an ordered list of strategies and takes the first hit:
//!
//! 1. `embedded-permalink`: the full `/posts/<slug>_..-activity-<token>..`
//!    path somewhere in the item's own markup
//! 2. `slug-anchor`: an anchor whose target carries this page's slug and an
//!    activity marker
//! 3. `post-anchor`: any anchor that looks like a post permalink
//! 4. `activity-urn`: a synthesized `/feed/update/urn:li:activity:<token>`
//!    URL built from the item's `data-urn` attribute
//!
//! The numeric activity token doubles as a publish timestamp: its upper bits
//! are epoch milliseconds. Timestamp resolution prefers an explicit `<time
//! datetime>` attribute, then the decoded token, then the harvest time.

use chrono::{DateTime, Local, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static TIME_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("time").unwrap());
static LINKEDIN_ORIGIN: Lazy<Url> = Lazy::new(|| Url::parse("https://www.linkedin.com").unwrap());

/// A resolved post identity: the permanent link plus the activity token when
/// one was recoverable.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedIdentity {
    /// Permanent URL of the post.
    pub link: String,
    /// The opaque numeric activity token, when known.
    pub token: Option<String>,
}

/// Shared input handed to every link strategy.
struct StrategyInput<'a> {
    fragment: &'a Html,
    raw_html: &'a str,
    slug: &'a str,
    token: Option<&'a str>,
}

type LinkStrategy = fn(&StrategyInput) -> Option<ResolvedIdentity>;

/// Ordered link resolution strategies; first hit wins.
const LINK_STRATEGIES: &[(&str, LinkStrategy)] = &[
    ("embedded-permalink", from_embedded_markup),
    ("slug-anchor", from_slug_anchor),
    ("post-anchor", from_any_post_anchor),
    ("activity-urn", from_activity_urn),
];

/// Resolve the permanent link of a raw feed item.
///
/// # Arguments
///
/// * `raw_html` - The item's outer HTML as handed over by the renderer
/// * `fragment` - The same markup parsed as a fragment
/// * `slug` - The slug of the page being harvested
///
/// # Returns
///
/// The resolved identity, or `None` when no strategy produced a link. A
/// `None` is non-fatal; the caller skips the item and counts it.
pub fn resolve_identity(raw_html: &str, fragment: &Html, slug: &str) -> Option<ResolvedIdentity> {
    let token = activity_token(fragment);
    let input = StrategyInput {
        fragment,
        raw_html,
        slug,
        token: token.as_deref(),
    };

    for (name, strategy) in LINK_STRATEGIES {
        if let Some(mut resolved) = strategy(&input) {
            debug!(strategy = name, link = %resolved.link, "Resolved post identity");
            if resolved.token.is_none() {
                resolved.token = token.clone();
            }
            return Some(resolved);
        }
    }
    None
}

/// Resolve the publish timestamp of a raw feed item.
///
/// Preference order: an explicit `<time datetime>` attribute (stored
/// verbatim), the timestamp decoded from the activity token, and finally
/// the current time. Always returns something usable.
pub fn resolve_published(fragment: &Html, token: Option<&str>) -> String {
    for time_el in fragment.select(&TIME_SELECTOR) {
        if let Some(dt) = time_el.value().attr("datetime") {
            if !dt.is_empty() {
                return dt.to_string();
            }
        }
    }

    if let Some(token) = token {
        if let Some(decoded) = decode_activity_timestamp(token) {
            return decoded.to_rfc3339();
        }
    }

    Local::now().to_rfc3339()
}

/// Decode the publish time hidden in a LinkedIn activity token.
///
/// The token is a decimal integer whose value shifted right by 22 bits is
/// the publish time in epoch milliseconds (UTC). Tokens are parsed through
/// 128 bits because synthetic and future values overflow a `u64`.
///
/// # Returns
///
/// The decoded UTC timestamp, or `None` for non-numeric tokens and values
/// outside the representable millisecond range. Failure here is non-fatal.
pub fn decode_activity_timestamp(token: &str) -> Option<DateTime<Utc>> {
    let id: u128 = token.trim().parse().ok()?;
    let millis = i64::try_from(id >> 22).ok()?;
    DateTime::from_timestamp_millis(millis)
}

/// The item's own element inside the parsed fragment wrapper.
fn item_root(fragment: &Html) -> Option<ElementRef<'_>> {
    fragment.root_element().children().find_map(ElementRef::wrap)
}

/// The activity token from the item's `data-urn` attribute, when present.
fn activity_token(fragment: &Html) -> Option<String> {
    let root = item_root(fragment)?;
    let urn = root.value().attr("data-urn")?;
    if !urn.contains("activity") {
        return None;
    }
    urn.rsplit(':').next().map(str::to_string)
}

fn from_embedded_markup(input: &StrategyInput) -> Option<ResolvedIdentity> {
    let token = input.token?;
    let pattern = format!(
        r"/posts/{}_[a-z0-9\-]+activity-{}[a-zA-Z0-9\-]*",
        regex::escape(input.slug),
        regex::escape(token)
    );
    let re = Regex::new(&pattern).ok()?;
    let found = re.find(input.raw_html)?;
    Some(ResolvedIdentity {
        link: format!("https://www.linkedin.com{}", found.as_str()),
        token: Some(token.to_string()),
    })
}

fn from_slug_anchor(input: &StrategyInput) -> Option<ResolvedIdentity> {
    let marker = format!("/posts/{}_", input.slug);
    anchor_identity(input.fragment, |href| {
        href.contains(&marker) && href.contains("activity-")
    })
}

fn from_any_post_anchor(input: &StrategyInput) -> Option<ResolvedIdentity> {
    anchor_identity(input.fragment, |href| {
        href.contains("/posts/") && href.contains("activity-")
    })
}

fn from_activity_urn(input: &StrategyInput) -> Option<ResolvedIdentity> {
    let token = input.token?;
    Some(ResolvedIdentity {
        link: format!("https://www.linkedin.com/feed/update/urn:li:activity:{token}"),
        token: Some(token.to_string()),
    })
}

/// First anchor in document order whose target passes `accept`, stripped of
/// its query string and absolutized against the LinkedIn origin.
fn anchor_identity(fragment: &Html, accept: impl Fn(&str) -> bool) -> Option<ResolvedIdentity> {
    for anchor in fragment.select(&ANCHOR_SELECTOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !accept(href) {
            continue;
        }
        let Ok(mut url) = LINKEDIN_ORIGIN.join(href) else {
            continue;
        };
        url.set_query(None);
        url.set_fragment(None);

        let link = url.to_string();
        let token = link
            .split("activity-")
            .nth(1)
            .map(|suffix| suffix.trim_end_matches('/').to_string());
        return Some(ResolvedIdentity { link, token });
    }
    None
}
