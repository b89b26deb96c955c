//! Browser session persistence.
//!
//! A successful LinkedIn login is worth keeping: the session cookies are
//! saved as a JSON blob and restored into fresh browser sessions so that
//! subsequent runs skip the interactive login entirely. The blob lives in
//! the browser-state directory as `linkedin_state.json`.

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

/// The persisted session blob.
///
/// Cookies are kept as opaque JSON objects exactly as the WebDriver server
/// reported them, so nothing is lost or reinterpreted on the round trip.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SessionState {
    /// When the blob was written, ISO-8601.
    pub saved_at: String,
    /// WebDriver cookie objects, verbatim.
    #[serde(default)]
    pub cookies: Vec<Value>,
}

/// Loads and saves the session blob for one browser-state directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(state_dir: &str) -> Self {
        SessionStore {
            path: Path::new(state_dir).join("linkedin_state.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved session, if a readable one exists.
    ///
    /// A missing file is the normal first-run case; an unreadable one is
    /// logged and treated the same way, forcing a fresh login.
    pub async fn load(&self) -> Option<SessionState> {
        let raw = fs::read_to_string(&self.path).await.ok()?;
        match serde_json::from_str(&raw) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Saved session is unreadable; a fresh login will be needed");
                None
            }
        }
    }

    /// Persist the given cookies, replacing any previous blob.
    ///
    /// The write goes through a temporary file and a rename so a crash can
    /// never leave a half-written blob behind.
    pub async fn save(&self, cookies: Vec<Value>) -> Result<(), Box<dyn Error>> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let state = SessionState {
            saved_at: Local::now().to_rfc3339(),
            cookies,
        };
        let json = serde_json::to_string_pretty(&state)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;

        info!(path = %self.path.display(), cookies = state.cookies.len(), "Saved browser session");
        Ok(())
    }
}
