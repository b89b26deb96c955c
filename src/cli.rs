//! Command-line interface definitions for the LinkedIn feed generator.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Shared options can be provided via command-line flags or environment
//! variables and apply to every subcommand.

use crate::browser::webdriver::DEFAULT_WEBDRIVER_URL;
use clap::{Parser, Subcommand};

/// Command-line arguments for the LinkedIn feed generator.
///
/// # Examples
///
/// ```sh
/// # Sync every active page in pages.yaml
/// linkedin_feed sync
///
/// # Sync one page, even if paused
/// linkedin_feed sync master-concept --force
///
/// # Log in once so later syncs can run headless
/// linkedin_feed login
///
/// # Serve the generated feeds on port 8000
/// linkedin_feed serve
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory the feed XML and posts JSON are written to
    #[arg(short, long, global = true, default_value = "feed")]
    pub feed_dir: String,

    /// Directory holding the saved browser session
    #[arg(short, long, global = true, default_value = "browser_state")]
    pub state_dir: String,

    /// Path to the pages configuration file
    #[arg(short, long, global = true, default_value = "pages.yaml")]
    pub config: String,

    /// WebDriver server URL (a running chromedriver)
    #[arg(long, global = true, env = "WEBDRIVER_URL", default_value = DEFAULT_WEBDRIVER_URL)]
    pub webdriver_url: String,

    /// Run the browser without a window; interactive login needs one
    #[arg(long, global = true, env = "HEADLESS")]
    pub headless: bool,

    /// Posts to collect for a page that has no feed yet
    #[arg(long, global = true, default_value_t = 10)]
    pub max_posts_initial: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sync pages and regenerate their feeds
    Sync {
        /// Page URL or configured slug; all active pages when omitted
        page: Option<String>,

        /// Sync paused pages too
        #[arg(long)]
        force: bool,
    },

    /// Serve the overview page and feeds over HTTP
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 8000)]
        port: u16,
    },

    /// Open a browser to log in to LinkedIn and save the session
    Login,

    /// Remove legacy feed files and run leftovers (locks, temp files,
    /// failure screenshots)
    Cleanup,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_defaults() {
        let cli = Cli::parse_from(["linkedin_feed", "sync"]);

        assert_eq!(cli.feed_dir, "feed");
        assert_eq!(cli.state_dir, "browser_state");
        assert_eq!(cli.config, "pages.yaml");
        assert_eq!(cli.webdriver_url, DEFAULT_WEBDRIVER_URL);
        assert_eq!(cli.max_posts_initial, 10);
        assert!(!cli.headless);
        match cli.command {
            Command::Sync { page, force } => {
                assert!(page.is_none());
                assert!(!force);
            }
            _ => panic!("expected sync"),
        }
    }

    #[test]
    fn test_sync_single_page_with_force() {
        let cli = Cli::parse_from(["linkedin_feed", "sync", "master-concept", "--force"]);
        match cli.command {
            Command::Sync { page, force } => {
                assert_eq!(page.as_deref(), Some("master-concept"));
                assert!(force);
            }
            _ => panic!("expected sync"),
        }
    }

    #[test]
    fn test_global_flags_allowed_after_subcommand() {
        let cli = Cli::parse_from(["linkedin_feed", "sync", "--feed-dir", "/tmp/out", "--headless"]);
        assert_eq!(cli.feed_dir, "/tmp/out");
        assert!(cli.headless);
    }

    #[test]
    fn test_serve_port() {
        let cli = Cli::parse_from(["linkedin_feed", "serve"]);
        assert!(matches!(cli.command, Command::Serve { port: 8000 }));

        let cli = Cli::parse_from(["linkedin_feed", "serve", "-p", "9000"]);
        assert!(matches!(cli.command, Command::Serve { port: 9000 }));
    }

    #[test]
    fn test_login_and_cleanup_parse() {
        assert!(matches!(Cli::parse_from(["linkedin_feed", "login"]).command, Command::Login));
        assert!(matches!(Cli::parse_from(["linkedin_feed", "cleanup"]).command, Command::Cleanup));
    }

    #[test]
    fn test_environment_variable_bindings() {
        use clap::CommandFactory;

        let command = Cli::command();
        let env_of = |name: &str| {
            command
                .get_arguments()
                .find(|arg| arg.get_id().as_str() == name)
                .and_then(|arg| arg.get_env())
                .and_then(|var| var.to_str())
        };

        assert_eq!(env_of("webdriver_url"), Some("WEBDRIVER_URL"));
        assert_eq!(env_of("headless"), Some("HEADLESS"));
        assert_eq!(env_of("feed_dir"), None);
    }
}
