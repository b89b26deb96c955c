//! WebDriver protocol client.
//!
//! Drives a WebDriver-compatible browser endpoint (chromedriver, a Selenium
//! server) over plain HTTP + JSON: one session per run, navigation, script
//! execution for DOM queries, and the cookie endpoints for session
//! restore. Nothing here interprets post markup; the scrape stages do that.
//!
//! The server is expected to be already running; its URL comes from the
//! `WEBDRIVER_URL` environment variable or the CLI flag.

use crate::browser::{PostSource, RawPost, SessionStore};
use crate::utils::truncate_for_log;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Default chromedriver endpoint.
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

/// How long a freshly navigated page gets to settle.
const NAV_SETTLE: Duration = Duration::from_secs(3);
/// How long newly loaded items get to render after a scroll.
const SCROLL_SETTLE: Duration = Duration::from_millis(2500);
/// Interactive login: total wait and polling step.
const LOGIN_WAIT_MAX: Duration = Duration::from_secs(180);
const LOGIN_POLL_STEP: Duration = Duration::from_secs(3);

/// Feed item selectors: the `data-urn` form first, older layouts after.
const POST_SELECTORS: &[&str] = &[
    "[data-urn*='urn:li:activity']",
    ".feed-shared-update-v2",
    ".occludable-update",
];

/// Page title candidates, most specific first.
const PAGE_NAME_SELECTORS: &[&str] = &[
    "h1.org-top-card-summary__title",
    "h1[class*='top-card']",
    ".org-top-card-summary__title",
    "h1",
];

/// Elements that only render for an authenticated member.
const LOGGED_IN_SELECTORS: &[&str] = &[
    "[data-control-name='nav.settings']",
    ".global-nav__me",
    ".feed-identity-module",
    "nav.global-nav",
];

/// Elements that only render on the auth wall.
const LOGIN_WALL_SELECTORS: &[&str] = &["[data-test-id='login-form']", ".authwall"];

/// Connection options for the WebDriver server.
#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    /// Base URL of the WebDriver server.
    pub server_url: String,
    /// Run the browser without a visible window. Interactive logins need a
    /// visible one.
    pub headless: bool,
}

/// A live browser session implementing [`PostSource`].
pub struct WebDriverSource {
    client: Client,
    server_url: String,
    session_id: String,
    store: SessionStore,
    // Index into POST_SELECTORS once a selector has matched; the layout
    // does not change mid-run, so later snapshots reuse it.
    post_selector: Option<usize>,
}

impl WebDriverSource {
    /// Create a browser session on the configured server.
    ///
    /// # Arguments
    ///
    /// * `config` - Server URL and headless toggle
    /// * `store` - Where session cookies are loaded from and saved to
    #[instrument(level = "info", skip_all, fields(server = %config.server_url, headless = config.headless))]
    pub async fn connect(config: &WebDriverConfig, store: SessionStore) -> Result<Self, Box<dyn Error>> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        let mut args = vec![
            "--window-size=1280,720".to_string(),
            "--user-agent=Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
        ];
        if config.headless {
            args.push("--headless=new".to_string());
        }

        let payload = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        });

        let resp = client
            .post(format!("{}/session", config.server_url))
            .json(&payload)
            .send()
            .await?;
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(format!(
                "WebDriver session creation failed ({status}): {}",
                truncate_for_log(&body.to_string(), 300)
            )
            .into());
        }

        let session_id = body["value"]["sessionId"]
            .as_str()
            .ok_or("WebDriver session response carried no sessionId")?
            .to_string();
        info!(session = %session_id, "Browser session created");

        Ok(WebDriverSource {
            client,
            server_url: config.server_url.clone(),
            session_id,
            store,
            post_selector: None,
        })
    }

    /// One WebDriver command against the current session.
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, Box<dyn Error>> {
        let url = format!("{}/session/{}{}", self.server_url, self.session_id, path);
        let mut req = self.client.request(method, &url);
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let payload: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(format!(
                "WebDriver command {path} failed ({status}): {}",
                truncate_for_log(&payload.to_string(), 300)
            )
            .into());
        }
        Ok(payload.get("value").cloned().unwrap_or(Value::Null))
    }

    /// Run a script in the page and return its result.
    async fn execute(&self, script: &str, args: Value) -> Result<Value, Box<dyn Error>> {
        self.request(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    /// Navigate and give the page time to settle.
    pub async fn navigate(&self, url: &str) -> Result<(), Box<dyn Error>> {
        debug!(%url, "Navigating");
        self.request(Method::POST, "/url", Some(json!({ "url": url }))).await?;
        sleep(NAV_SETTLE).await;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, Box<dyn Error>> {
        let value = self.request(Method::GET, "/url", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Whether any element matches the selector.
    async fn exists(&self, selector: &str) -> bool {
        self.execute(
            "return document.querySelector(arguments[0]) !== null;",
            json!([selector]),
        )
        .await
        .map(|v| v.as_bool().unwrap_or(false))
        .unwrap_or(false)
    }

    /// Trimmed visible text of the first element matching the selector.
    async fn first_text(&self, selector: &str) -> Option<String> {
        let value = self
            .execute(
                "const el = document.querySelector(arguments[0]); return el ? el.innerText : null;",
                json!([selector]),
            )
            .await
            .ok()?;
        let text = value.as_str()?.trim().to_string();
        if text.is_empty() { None } else { Some(text) }
    }

    /// Whether any element matching the selector contains the given text.
    async fn text_found(&self, selector: &str, needle: &str) -> bool {
        self.execute(
            "const needle = arguments[1];\n\
             for (const el of document.querySelectorAll(arguments[0])) {\n\
               if (((el.innerText || '').trim()).includes(needle)) return true;\n\
             }\n\
             return false;",
            json!([selector, needle]),
        )
        .await
        .map(|v| v.as_bool().unwrap_or(false))
        .unwrap_or(false)
    }

    /// Click the first element matching the selector whose text contains
    /// `needle`; an empty needle accepts any match.
    async fn click_first(&self, selector: &str, needle: &str) -> bool {
        self.execute(
            "const needle = arguments[1];\n\
             for (const el of document.querySelectorAll(arguments[0])) {\n\
               const text = (el.innerText || '').trim();\n\
               if (!needle || text.includes(needle)) { el.click(); return true; }\n\
             }\n\
             return false;",
            json!([selector, needle]),
        )
        .await
        .map(|v| v.as_bool().unwrap_or(false))
        .unwrap_or(false)
    }

    async fn cookies(&self) -> Result<Vec<Value>, Box<dyn Error>> {
        let value = self.request(Method::GET, "/cookie", None).await?;
        Ok(value.as_array().cloned().unwrap_or_default())
    }

    async fn add_cookie(&self, cookie: &Value) -> Result<(), Box<dyn Error>> {
        self.request(Method::POST, "/cookie", Some(json!({ "cookie": cookie })))
            .await?;
        Ok(())
    }

    /// Save the current session cookies through the store.
    pub async fn persist_session(&self) -> Result<(), Box<dyn Error>> {
        let cookies = self.cookies().await?;
        self.store.save(cookies).await
    }

    /// Write a PNG screenshot of the current page, for failure diagnosis.
    pub async fn screenshot(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        let value = self.request(Method::GET, "/screenshot", None).await?;
        let encoded = value.as_str().ok_or("screenshot response was not a string")?;
        let bytes = BASE64.decode(encoded)?;
        tokio::fs::write(path, bytes).await?;
        info!(path = %path.display(), "Saved debug screenshot");
        Ok(())
    }

    /// Open a LinkedIn page ready for harvesting.
    ///
    /// Restores saved session cookies when a blob exists (cookies can only
    /// be installed from their own origin, hence the preliminary
    /// navigation), waits out the auth wall if one appears, and puts the
    /// feed into "all posts, newest first" view.
    pub async fn open_page(&mut self, page_url: &str) -> Result<(), Box<dyn Error>> {
        if let Some(state) = self.store.load().await {
            info!(cookies = state.cookies.len(), saved_at = %state.saved_at, "Restoring saved browser session");
            self.navigate("https://www.linkedin.com").await?;
            let mut restored = 0usize;
            for cookie in &state.cookies {
                match self.add_cookie(cookie).await {
                    Ok(()) => restored += 1,
                    Err(e) => debug!(error = %e, "Cookie not restored"),
                }
            }
            debug!(restored, total = state.cookies.len(), "Session cookies restored");
        }

        self.navigate(page_url).await?;

        if self.needs_login().await? {
            info!("LinkedIn login required; complete it in the browser window");
            self.wait_for_login().await;
            if let Err(e) = self.persist_session().await {
                warn!(error = %e, "Could not save browser session");
            }
            self.navigate(page_url).await?;
        }

        self.prepare_feed_view().await;
        Ok(())
    }

    async fn needs_login(&self) -> Result<bool, Box<dyn Error>> {
        for selector in LOGIN_WALL_SELECTORS {
            if self.exists(selector).await {
                return Ok(true);
            }
        }
        if self.text_found("a, button", "Sign in").await
            || self.text_found("a, button", "Continue with Google").await
        {
            return Ok(true);
        }

        let url = self.current_url().await?;
        Ok(url.contains("login") || url.contains("authwall") || url.contains("signup"))
    }

    /// Poll for a completed login, up to [`LOGIN_WAIT_MAX`]. Timing out is
    /// not fatal; the run continues and fails later if truly locked out.
    async fn wait_for_login(&self) {
        let mut waited = Duration::ZERO;
        while waited < LOGIN_WAIT_MAX {
            sleep(LOGIN_POLL_STEP).await;
            waited += LOGIN_POLL_STEP;

            if self.is_logged_in().await {
                info!(waited_secs = waited.as_secs(), "Login detected");
                return;
            }
            if waited.as_secs() % 30 == 0 {
                info!(waited_secs = waited.as_secs(), "Still waiting for login");
            }
        }
        warn!("Login not detected within the wait window; continuing anyway");
    }

    async fn is_logged_in(&self) -> bool {
        for selector in LOGGED_IN_SELECTORS {
            if self.exists(selector).await {
                return true;
            }
        }

        // Off the auth wall and showing navigation counts as logged in.
        if let Ok(url) = self.current_url().await {
            if !url.contains("authwall")
                && !url.contains("login")
                && !url.contains("signup")
                && self.exists(".global-nav").await
            {
                return true;
            }
        }
        false
    }

    /// Best-effort clicks that pin the feed to "All" posts sorted by most
    /// recent. The URL parameters request the same view, so failures are
    /// logged and ignored.
    async fn prepare_feed_view(&self) {
        let all_clicked = self.click_first("button", "All").await
            || self.click_first("[aria-label='All']", "").await;
        if all_clicked {
            debug!("Selected the All posts tab");
            sleep(Duration::from_secs(2)).await;
        } else {
            debug!("All tab not found; it may already be selected");
        }

        let sort_clicked = self.click_first("button", "Recent").await
            || self.click_first("[aria-label*='Sort by']", "").await
            || self.click_first("button.artdeco-dropdown__trigger", "").await;
        if sort_clicked {
            sleep(Duration::from_secs(2)).await;
            // A dropdown may have opened; pick its Recent option.
            if self.click_first("li, div[role='option'], span", "Recent").await {
                debug!("Selected Recent from the sort dropdown");
                sleep(Duration::from_secs(2)).await;
            }
        } else {
            debug!("Sort control not found; relying on URL parameters");
        }
    }

    /// Tear the session down. Failures only warn; the server reaps
    /// abandoned sessions on its own.
    pub async fn close(self) {
        if let Err(e) = self.request(Method::DELETE, "", None).await {
            warn!(error = %e, "Could not close browser session");
        } else {
            debug!(session = %self.session_id, "Browser session closed");
        }
    }
}

impl PostSource for WebDriverSource {
    async fn page_name(&mut self) -> Option<String> {
        for selector in PAGE_NAME_SELECTORS {
            if let Some(name) = self.first_text(selector).await {
                if name.chars().count() > 2 {
                    info!(page_name = %name, "Found page name");
                    return Some(name);
                }
            }
        }
        None
    }

    async fn posts(&mut self) -> Result<Vec<RawPost>, Box<dyn Error>> {
        const SNAPSHOT: &str =
            "return Array.from(document.querySelectorAll(arguments[0])).map(el => el.outerHTML);";

        if let Some(idx) = self.post_selector {
            let value = self.execute(SNAPSHOT, json!([POST_SELECTORS[idx]])).await?;
            return Ok(raw_posts(value));
        }

        for (idx, selector) in POST_SELECTORS.iter().enumerate() {
            let value = self.execute(SNAPSHOT, json!([selector])).await?;
            let items = raw_posts(value);
            if !items.is_empty() {
                info!(count = items.len(), selector, "Found rendered posts");
                self.post_selector = Some(idx);
                return Ok(items);
            }
        }
        Ok(Vec::new())
    }

    async fn load_more(&mut self) -> Result<(), Box<dyn Error>> {
        self.execute("window.scrollTo(0, document.body.scrollHeight);", json!([]))
            .await?;
        sleep(SCROLL_SETTLE).await;
        Ok(())
    }
}

fn raw_posts(value: Value) -> Vec<RawPost> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str())
                .map(|html| RawPost { html: html.to_string() })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_posts_from_script_value() {
        let value = json!(["<div data-urn=\"urn:li:activity:1\">a</div>", "<div>b</div>"]);
        let posts = raw_posts(value);
        assert_eq!(posts.len(), 2);
        assert!(posts[0].html.contains("urn:li:activity:1"));
    }

    #[test]
    fn test_raw_posts_tolerates_non_array() {
        assert!(raw_posts(Value::Null).is_empty());
        assert!(raw_posts(json!("nope")).is_empty());
    }

    #[test]
    fn test_post_selectors_cover_known_layouts() {
        assert!(POST_SELECTORS[0].contains("urn:li:activity"));
        assert!(POST_SELECTORS.contains(&".feed-shared-update-v2"));
        assert!(POST_SELECTORS.contains(&".occludable-update"));
    }
}
