//! Pages configuration file handling.
//!
//! The `pages.yaml` file lists the LinkedIn pages to sync. Each entry has a
//! `url` and an optional `status` (`active` or `paused`); paused pages are
//! skipped unless the run is forced.
//!
//! ```yaml
//! pages:
//!   - url: https://www.linkedin.com/company/master-concept/
//!   - url: https://www.linkedin.com/showcase/acme-cloud/
//!     status: paused
//! ```

use crate::utils::slug_from_url;
use serde::Deserialize;
use std::error::Error;
use tokio::fs;

/// The parsed pages configuration file.
#[derive(Debug, Deserialize)]
pub struct PagesConfig {
    /// All configured pages, in file order.
    pub pages: Vec<PageEntry>,
}

/// One configured LinkedIn page.
#[derive(Debug, Clone, Deserialize)]
pub struct PageEntry {
    /// The page URL as written in the config; normalized at sync time.
    pub url: String,
    /// Whether the page participates in unforced batch runs.
    #[serde(default)]
    pub status: PageStatus,
}

/// Sync participation state of a configured page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    /// Synced on every run.
    #[default]
    Active,
    /// Skipped unless `--force` is given.
    Paused,
}

impl PageEntry {
    /// The slug derived from this entry's URL.
    pub fn slug(&self) -> String {
        slug_from_url(&self.url)
    }

    pub fn is_active(&self) -> bool {
        self.status == PageStatus::Active
    }
}

impl PagesConfig {
    /// Load and parse the configuration file at `path`.
    pub async fn load(path: &str) -> Result<Self, Box<dyn Error>> {
        let raw = fs::read_to_string(path)
            .await
            .map_err(|e| format!("cannot read pages config {path}: {e}"))?;
        let config: PagesConfig = serde_yaml::from_str(&raw)?;
        Ok(config)
    }

    /// Find the configured page whose URL yields `slug`.
    pub fn find(&self, slug: &str) -> Option<&PageEntry> {
        self.pages.iter().find(|entry| entry.slug() == slug)
    }

    /// Slugs of every configured page, for diagnostics.
    pub fn slugs(&self) -> Vec<String> {
        self.pages.iter().map(|entry| entry.slug()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r#"
pages:
  - url: https://www.linkedin.com/company/master-concept/
"#;
        let config: PagesConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.pages.len(), 1);
        assert_eq!(config.pages[0].status, PageStatus::Active);
        assert!(config.pages[0].is_active());
        assert_eq!(config.pages[0].slug(), "master-concept");
    }

    #[test]
    fn test_parse_paused_entry() {
        let yaml = r#"
pages:
  - url: https://www.linkedin.com/company/master-concept/
    status: active
  - url: https://www.linkedin.com/showcase/acme-cloud/
    status: paused
"#;
        let config: PagesConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.pages.len(), 2);
        assert!(config.pages[0].is_active());
        assert!(!config.pages[1].is_active());
    }

    #[test]
    fn test_find_by_slug() {
        let yaml = r#"
pages:
  - url: https://www.linkedin.com/company/master-concept/
  - url: https://www.linkedin.com/showcase/acme-cloud/
"#;
        let config: PagesConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.find("acme-cloud").is_some());
        assert!(config.find("missing").is_none());
        assert_eq!(config.slugs(), vec!["master-concept", "acme-cloud"]);
    }
}
