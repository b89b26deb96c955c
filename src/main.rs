//! # LinkedIn Feed
//!
//! A feed generator that harvests posts from LinkedIn company and showcase
//! pages through a WebDriver-controlled browser and republishes them as
//! styled RSS feeds.
//!
//! ## Features
//!
//! - Syncs any number of company/showcase pages listed in `pages.yaml`
//! - Incremental: each run collects only posts newer than the feed's
//!   newest item, merging them into the stored history
//! - Persists posts as JSON and renders RSS 2.0 with an XSL stylesheet,
//!   plus an overview page linking every feed
//! - Reuses a saved LinkedIn session; one interactive `login` is enough
//!   for later headless runs
//! - Serves the generated files over HTTP for feed readers
//!
//! ## Usage
//!
//! ```sh
//! linkedin_feed login
//! linkedin_feed sync
//! linkedin_feed serve -p 8000
//! ```
//!
//! ## Architecture
//!
//! A sync run is a pipeline per page:
//! 1. **Render**: open the page in the browser, restore the session, and
//!    put the feed into "all posts, newest first" view
//! 2. **Harvest**: read rendered posts and scroll for more until the
//!    previous run's newest post (or a cap) is reached
//! 3. **Merge**: combine new posts with the stored ones, dropping
//!    duplicate links
//! 4. **Output**: rewrite the page's posts JSON and feed XML, then
//!    regenerate the overview page

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod browser;
mod cli;
mod config;
mod lock;
mod models;
mod outputs;
mod scrape;
mod serve;
mod utils;

use browser::{PostSource, SessionStore, WebDriverConfig, WebDriverSource};
use cli::{Cli, Command};
use config::{PageEntry, PagesConfig};
use lock::RunLock;
use models::{merge_posts, PageFeed};
use outputs::{index, json, rss};
use scrape::{read_high_water_mark, scrape_page, ScrapeContext};
use utils::{display_name_from_slug, ensure_writable_dir, normalize_page_url, slug_from_url};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("linkedin_feed starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args.feed_dir, ?args.state_dir, ?args.config, "Parsed CLI arguments");

    match &args.command {
        Command::Sync { page, force } => run_sync(&args, page.as_deref(), *force).await?,
        Command::Serve { port } => {
            let index_file = index::index_path(&args.feed_dir);
            let root = index_file
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .to_string_lossy()
                .into_owned();
            serve::serve(&root, *port).await?;
        }
        Command::Login => run_login(&args).await?,
        Command::Cleanup => run_cleanup(&args).await?,
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}

/// Sync one page, a one-off URL, or every configured page.
async fn run_sync(args: &Cli, page: Option<&str>, force: bool) -> Result<(), Box<dyn Error>> {
    // Early check: ensure the feed dir is writable
    if let Err(e) = ensure_writable_dir(&args.feed_dir).await {
        error!(
            path = %args.feed_dir,
            error = %e,
            "Feed directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let config = PagesConfig::load(&args.config).await?;

    // ---- Decide which pages run ----
    let targets: Vec<PageEntry> = match page {
        None | Some("all") => config.pages.clone(),
        Some(selector) => {
            let slug = if selector.contains("linkedin.com") {
                slug_from_url(selector)
            } else {
                selector.to_string()
            };
            match config.find(&slug) {
                Some(entry) => vec![entry.clone()],
                // A full URL that is not configured still syncs, as a one-off.
                None if selector.contains("linkedin.com") => vec![PageEntry {
                    url: selector.to_string(),
                    status: Default::default(),
                }],
                None => {
                    return Err(format!(
                        "unknown page '{selector}'; configured slugs: {}",
                        config.slugs().join(", ")
                    )
                    .into());
                }
            }
        }
    };
    info!(pages = targets.len(), force, "Starting sync");

    // ---- Sync pages one at a time ----
    let mut synced = 0usize;
    let mut failures: Vec<String> = Vec::new();

    for entry in &targets {
        let slug = entry.slug();
        if !entry.is_active() && !force {
            info!(%slug, "Page is paused; skipping");
            continue;
        }

        match run_page(args, entry).await {
            Ok(new_posts) => {
                synced += 1;
                info!(%slug, new_posts, "Page synced");
            }
            Err(e) => {
                error!(%slug, error = %e, "Page sync failed");
                failures.push(slug);
            }
        }
    }

    // The overview page reflects whatever state the runs left behind,
    // including pages that failed or were skipped.
    if let Err(e) = index::write_index(&config, &args.feed_dir).await {
        error!(error = %e, "Failed to write overview page");
    }

    if !failures.is_empty() {
        return Err(format!(
            "{} page(s) failed to sync: {}",
            failures.len(),
            failures.join(", ")
        )
        .into());
    }
    info!(synced, "Sync complete");
    Ok(())
}

/// Run the full pipeline for one page: render, harvest, merge, output.
///
/// Returns the number of new posts collected. A failed run returns before
/// the output stage, leaving the page's stored state untouched.
#[instrument(level = "info", skip_all, fields(slug = %entry.slug()))]
async fn run_page(args: &Cli, entry: &PageEntry) -> Result<usize, Box<dyn Error>> {
    let slug = entry.slug();
    let page_url = normalize_page_url(&entry.url);
    let _lock = RunLock::acquire(&args.feed_dir, &slug)?;

    let feed_path = Path::new(&args.feed_dir).join(format!("{slug}.xml"));
    let mark = read_high_water_mark(&feed_path).await;

    let store = SessionStore::new(&args.state_dir);
    let driver_config = WebDriverConfig {
        server_url: args.webdriver_url.clone(),
        headless: args.headless,
    };
    let mut source = WebDriverSource::connect(&driver_config, store).await?;

    let harvest = async {
        source.open_page(&page_url).await?;
        let name = source.page_name().await;
        let ctx = ScrapeContext {
            slug: slug.clone(),
            mark,
            max_posts_initial: args.max_posts_initial,
        };
        let outcome = scrape_page(&mut source, &ctx).await?;
        Ok::<_, Box<dyn Error>>((name, outcome))
    };

    let (scraped_name, outcome) = match harvest.await {
        Ok(result) => {
            source.close().await;
            result
        }
        Err(e) => {
            let shot = Path::new(&args.feed_dir).join(format!("{slug}_failure.png"));
            if let Err(shot_err) = source.screenshot(&shot).await {
                debug!(error = %shot_err, "Could not capture failure screenshot");
            }
            source.close().await;
            return Err(e);
        }
    };

    // ---- Merge and output ----
    let state = json::load_page_state(&args.feed_dir, &slug).await;
    let page_name = scraped_name
        .or(state.page_name)
        .unwrap_or_else(|| display_name_from_slug(&slug));

    let new_posts = outcome.posts.len();
    let merged = merge_posts(outcome.posts, state.posts);
    let feed = PageFeed {
        page_name,
        slug: slug.clone(),
        updated_at: Local::now().to_rfc3339(),
        posts: merged,
    };

    json::save_page_feed(&feed, &args.feed_dir).await?;
    rss::write_feed(&feed, &args.feed_dir).await?;

    Ok(new_posts)
}

/// Interactive login: open the login page, wait for the user, save cookies.
async fn run_login(args: &Cli) -> Result<(), Box<dyn Error>> {
    if args.headless {
        warn!("Login needs a visible browser window; ignoring --headless");
    }

    let store = SessionStore::new(&args.state_dir);
    let driver_config = WebDriverConfig {
        server_url: args.webdriver_url.clone(),
        headless: false,
    };
    let source = WebDriverSource::connect(&driver_config, store).await?;
    source.navigate("https://www.linkedin.com/login").await?;

    info!("Complete the login in the browser window, then press Enter here");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;

    let saved = source.persist_session().await;
    source.close().await;
    saved?;
    info!("Session saved; later syncs can run with --headless");
    Ok(())
}

/// Remove legacy single-feed artifacts and run leftovers, then report the
/// per-page files that remain.
async fn run_cleanup(args: &Cli) -> Result<(), Box<dyn Error>> {
    let mut entries = match tokio::fs::read_dir(&args.feed_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %args.feed_dir, "No feed directory; nothing to clean");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0usize;
    let mut remaining: Vec<String> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        // posts.json and linkedin_feed.xml predate per-page files.
        let legacy = name == "posts.json" || name == "linkedin_feed.xml";
        let leftover = name.ends_with(".tmp")
            || name.ends_with(".lock")
            || name.ends_with("_failure.png");

        if legacy || leftover {
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    info!(file = %name, "Removed");
                    removed += 1;
                }
                Err(e) => warn!(file = %name, error = %e, "Could not remove"),
            }
        } else {
            remaining.push(name);
        }
    }

    remaining.sort();
    if !remaining.is_empty() {
        info!(files = %remaining.join(", "), "Per-page files kept");
    }
    info!(removed, kept = remaining.len(), "Cleanup complete");
    Ok(())
}
