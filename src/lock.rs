//! Per-page run lock.
//!
//! Two syncs of the same page racing each other would both read the same
//! feed state and each write a full replacement, losing one side's posts.
//! A lock file per slug under the feed directory keeps runs for one page
//! mutually exclusive while leaving different pages free to run at the
//! same time. The file holds the owning process id for diagnostics.

use std::error::Error;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Exclusive hold on one page's sync, released on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Take the lock for `slug`, failing fast when another run holds it.
    pub fn acquire(feed_dir: &str, slug: &str) -> Result<RunLock, Box<dyn Error>> {
        std::fs::create_dir_all(feed_dir)?;
        let path = Path::new(feed_dir).join(format!(".{slug}.lock"));

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = write!(file, "{}", std::process::id());
                debug!(path = %path.display(), "Acquired run lock");
                Ok(RunLock { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = std::fs::read_to_string(&path).unwrap_or_default();
                Err(format!(
                    "another sync for '{slug}' is already running (lock {}, pid {})",
                    path.display(),
                    holder.trim()
                )
                .into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Could not remove run lock");
        }
    }
}
