//! RSS 2.0 feed generation.
//!
//! Renders a page's stored posts into `{feed_dir}/{slug}.xml`, newest
//! first. The feed references an XSL stylesheet written alongside it, so a
//! browser pointed at the raw XML shows a readable page instead of a tag
//! soup. Item bodies are carried twice, as `description` and as
//! `content:encoded`, both CDATA-wrapped HTML with the first post image
//! inlined; readers that understand neither fall back to the `enclosure`.
//!
//! All human-facing dates are rendered in Hong Kong time.

use crate::models::{PageFeed, Post};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::cmp::Reverse;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

pub(crate) static HKT: Lazy<FixedOffset> = Lazy::new(|| FixedOffset::east_opt(8 * 3600).unwrap());

/// Render and write a page's feed, replacing any previous version.
///
/// Also (re)installs the stylesheet next to it, so a feed directory is
/// always self-contained.
#[instrument(level = "info", skip_all, fields(slug = %feed.slug))]
pub async fn write_feed(feed: &PageFeed, feed_dir: &str) -> Result<(), Box<dyn Error>> {
    let xml = build_feed_xml(feed)?;

    fs::create_dir_all(feed_dir).await?;
    let path = Path::new(feed_dir).join(format!("{}.xml", feed.slug));
    let tmp = path.with_extension("xml.tmp");
    fs::write(&tmp, &xml).await?;
    fs::rename(&tmp, &path).await?;

    install_stylesheet(feed_dir).await?;
    info!(path = %path.display(), items = feed.posts.len(), "Wrote RSS feed");
    Ok(())
}

/// Write the XSL stylesheet the feeds reference into the feed directory.
pub async fn install_stylesheet(feed_dir: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(feed_dir).await?;
    let path = Path::new(feed_dir).join("rss-style.xsl");
    fs::write(&path, include_str!("../../assets/rss-style.xsl")).await?;
    Ok(())
}

/// Render the feed document as a string.
pub fn build_feed_xml(feed: &PageFeed) -> Result<String, Box<dyn Error>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    writer.write_event(Event::PI(BytesPI::new(
        "xml-stylesheet type=\"text/xsl\" href=\"rss-style.xsl\"",
    )))?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    rss.push_attribute(("xmlns:content", "http://purl.org/rss/1.0/modules/content/"));
    rss.push_attribute(("xmlns:atom", "http://www.w3.org/2005/Atom"));
    writer.write_event(Event::Start(rss))?;
    writer.write_event(Event::Start(BytesStart::new("channel")))?;

    let now_hkt = Utc::now().with_timezone(&*HKT);
    text_element(&mut writer, "title", &feed.page_name)?;
    text_element(&mut writer, "link", &channel_link(&feed.slug))?;
    text_element(
        &mut writer,
        "description",
        &format!(
            "Posts: {} | Last Update: {}",
            feed.posts.len(),
            now_hkt.format("%Y-%m-%d %I:%M %p HKT")
        ),
    )?;
    text_element(&mut writer, "language", "en")?;
    text_element(&mut writer, "lastBuildDate", &now_hkt.to_rfc2822())?;
    text_element(
        &mut writer,
        "generator",
        &format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
    )?;

    // Newest first; posts whose date never parses go to the end. The sort
    // is stable, so posts sharing a key keep their stored order.
    let mut items: Vec<&Post> = feed.posts.iter().collect();
    items.sort_by_key(|post| Reverse(parse_published(&post.published).unwrap_or(DateTime::UNIX_EPOCH)));

    for post in items {
        writer.write_event(Event::Start(BytesStart::new("item")))?;
        text_element(&mut writer, "title", &post.title)?;
        text_element(&mut writer, "link", &post.link)?;

        let mut guid = BytesStart::new("guid");
        guid.push_attribute(("isPermaLink", "false"));
        writer.write_event(Event::Start(guid))?;
        writer.write_event(Event::Text(BytesText::new(&post.link)))?;
        writer.write_event(Event::End(BytesEnd::new("guid")))?;

        let html = item_html(post);
        cdata_element(&mut writer, "description", &html)?;
        cdata_element(&mut writer, "content:encoded", &html)?;

        if let Some(img) = post.first_image() {
            let mut enclosure = BytesStart::new("enclosure");
            enclosure.push_attribute(("url", img));
            enclosure.push_attribute(("length", "0"));
            enclosure.push_attribute(("type", "image/jpeg"));
            writer.write_event(Event::Empty(enclosure))?;
        }

        let pub_date = match parse_published(&post.published) {
            Some(dt) => dt.with_timezone(&*HKT).to_rfc2822(),
            None => now_hkt.to_rfc2822(),
        };
        text_element(&mut writer, "pubDate", &pub_date)?;
        writer.write_event(Event::End(BytesEnd::new("item")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("channel")))?;
    writer.write_event(Event::End(BytesEnd::new("rss")))?;

    Ok(String::from_utf8(writer.into_inner())?)
}

/// The page URL a feed points back at.
pub(crate) fn channel_link(slug: &str) -> String {
    if slug.contains("showcase") {
        format!("https://www.linkedin.com/showcase/{slug}/")
    } else {
        format!("https://www.linkedin.com/company/{slug}/")
    }
}

/// Parse a stored `published` value. Accepts RFC 3339, a naive datetime
/// (read as UTC), or a bare date.
pub(crate) fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

/// Item body as HTML, with the first image inlined after the text.
fn item_html(post: &Post) -> String {
    let mut html = post.description.clone();
    if let Some(img) = post.first_image() {
        html.push_str("<br/><br/>");
        html.push_str(&format!(
            "<img src=\"{img}\" style=\"max-width: 100%; height: auto; margin: 10px 0;\" />"
        ));
        html.push_str("<br/>");
    }
    // "]]>" inside a CDATA section would end it early.
    html.replace("]]>", "]]&gt;")
}

fn text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> std::io::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))
}

fn cdata_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    html: &str,
) -> std::io::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::CData(BytesCData::new(html)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(link: &str, published: &str, body: &str) -> Post {
        Post {
            title: body.to_string(),
            link: link.to_string(),
            description: body.to_string(),
            published: published.to_string(),
            images: vec![],
            scraped_at: String::new(),
        }
    }

    fn feed(posts: Vec<Post>) -> PageFeed {
        PageFeed {
            page_name: "Acme Robotics".to_string(),
            slug: "acme-robotics".to_string(),
            updated_at: "2024-05-02T09:00:00+00:00".to_string(),
            posts,
        }
    }

    #[test]
    fn test_feed_references_stylesheet_and_declares_namespaces() {
        let xml = build_feed_xml(&feed(vec![])).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(xml.contains("<?xml-stylesheet type=\"text/xsl\" href=\"rss-style.xsl\"?>"));
        assert!(xml.contains("xmlns:content=\"http://purl.org/rss/1.0/modules/content/\""));
        assert!(xml.contains("xmlns:atom=\"http://www.w3.org/2005/Atom\""));
    }

    #[test]
    fn test_channel_metadata() {
        let mut f = feed(vec![
            post("https://l/p1", "2024-05-01T08:00:00+00:00", "one"),
            post("https://l/p2", "2024-05-02T08:00:00+00:00", "two"),
        ]);
        f.page_name = "Acme R&D".to_string();
        let xml = build_feed_xml(&f).unwrap();

        assert!(xml.contains("<title>Acme R&amp;D</title>"));
        assert!(xml.contains("<link>https://www.linkedin.com/company/acme-robotics/</link>"));
        assert!(xml.contains("Posts: 2 | Last Update:"));
        assert!(xml.contains("<language>en</language>"));
        assert!(xml.contains("<lastBuildDate>"));
        assert!(xml.contains("<generator>"));
    }

    #[test]
    fn test_showcase_slug_links_to_showcase_page() {
        let mut f = feed(vec![]);
        f.slug = "acme-showcase-security".to_string();
        let xml = build_feed_xml(&f).unwrap();
        assert!(xml.contains("https://www.linkedin.com/showcase/acme-showcase-security/"));
    }

    #[test]
    fn test_items_emitted_newest_first() {
        let f = feed(vec![
            post("https://l/old", "2024-01-01T00:00:00+00:00", "old post"),
            post("https://l/new", "2024-06-01T00:00:00+00:00", "new post"),
        ]);
        let xml = build_feed_xml(&f).unwrap();

        let new_at = xml.find("https://l/new").unwrap();
        let old_at = xml.find("https://l/old").unwrap();
        assert!(new_at < old_at);
    }

    #[test]
    fn test_unparseable_published_sorts_last() {
        let f = feed(vec![
            post("https://l/mystery", "sometime", "undated"),
            post("https://l/dated", "2024-06-01T00:00:00+00:00", "dated"),
        ]);
        let xml = build_feed_xml(&f).unwrap();

        assert!(xml.find("https://l/dated").unwrap() < xml.find("https://l/mystery").unwrap());
        // Still gets a pubDate, taken from the emission time.
        assert_eq!(xml.matches("<pubDate>").count(), 2);
    }

    #[test]
    fn test_pub_date_rendered_in_hong_kong_time() {
        let f = feed(vec![post("https://l/p", "2024-05-01T00:00:00+00:00", "p")]);
        let xml = build_feed_xml(&f).unwrap();
        assert!(xml.contains("Wed, 1 May 2024 08:00:00 +0800"));
    }

    #[test]
    fn test_item_body_is_cdata_with_inline_image() {
        let mut p = post("https://l/p", "2024-05-01T00:00:00+00:00", "Launch day!");
        p.images = vec!["https://media.licdn.com/dms/image/v2/abc/feedshare".to_string()];
        let xml = build_feed_xml(&feed(vec![p])).unwrap();

        assert!(xml.contains("<![CDATA[Launch day!<br/><br/><img src=\"https://media.licdn.com/dms/image/v2/abc/feedshare\""));
        assert!(xml.contains("<content:encoded>"));
        assert!(xml.contains(
            "<enclosure url=\"https://media.licdn.com/dms/image/v2/abc/feedshare\" length=\"0\" type=\"image/jpeg\"/>"
        ));
    }

    #[test]
    fn test_item_without_image_has_no_enclosure() {
        let f = feed(vec![post("https://l/p", "2024-05-01T00:00:00+00:00", "words only")]);
        let xml = build_feed_xml(&f).unwrap();
        assert!(!xml.contains("<enclosure"));
    }

    #[test]
    fn test_guid_is_not_a_permalink() {
        let f = feed(vec![post("https://l/p", "2024-05-01T00:00:00+00:00", "p")]);
        let xml = build_feed_xml(&f).unwrap();
        assert!(xml.contains("<guid isPermaLink=\"false\">https://l/p</guid>"));
    }

    #[test]
    fn test_cdata_terminator_in_body_is_neutralized() {
        let f = feed(vec![post("https://l/p", "2024-05-01T00:00:00+00:00", "tricky ]]> body")]);
        let xml = build_feed_xml(&f).unwrap();
        assert!(xml.contains("tricky ]]&gt; body"));
    }

    #[test]
    fn test_parse_published_accepts_known_shapes() {
        assert_eq!(
            parse_published("2024-05-01T10:00:00+02:00").unwrap().to_rfc3339(),
            "2024-05-01T08:00:00+00:00"
        );
        assert!(parse_published("2024-05-01T08:00:00.123").is_some());
        assert_eq!(
            parse_published("2024-05-01").unwrap().to_rfc3339(),
            "2024-05-01T00:00:00+00:00"
        );
        assert!(parse_published("three days ago").is_none());
    }
}
