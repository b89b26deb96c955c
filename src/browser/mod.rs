//! Renderer collaborators for pages that only exist after script execution.
//!
//! LinkedIn feeds render client-side behind an auth wall, so harvesting
//! needs a real browser. The scrape engine never talks to one directly; it
//! works against the [`PostSource`] trait, which hands over raw item markup
//! and loads more of it on request. The production implementation is
//! [`webdriver::WebDriverSource`], a WebDriver protocol client; tests use
//! scripted in-memory sources.
//!
//! # Submodules
//!
//! - [`webdriver`]: WebDriver protocol client (sessions, scripts, cookies)
//! - [`session`]: persisted cookie blob so logins survive between runs

pub mod session;
pub mod webdriver;

pub use session::SessionStore;
pub use webdriver::{WebDriverConfig, WebDriverSource};

use std::error::Error;

/// One rendered feed item, as raw outer HTML.
///
/// Handles are parsed lazily by the resolution and extraction stages; the
/// renderer itself never interprets them.
#[derive(Debug, Clone)]
pub struct RawPost {
    /// The item element's outer HTML.
    pub html: String,
}

/// A source of rendered feed items.
///
/// Implementations expose the page's current item list as a snapshot that
/// grows monotonically at the tail as [`load_more`](PostSource::load_more)
/// is called; earlier items keep their positions between snapshots.
pub trait PostSource {
    /// Display name of the page, when the renderer can determine one.
    async fn page_name(&mut self) -> Option<String>;

    /// Snapshot of every currently rendered item, top to bottom.
    async fn posts(&mut self) -> Result<Vec<RawPost>, Box<dyn Error>>;

    /// Ask the renderer to load more items after the current tail.
    async fn load_more(&mut self) -> Result<(), Box<dyn Error>>;
}
