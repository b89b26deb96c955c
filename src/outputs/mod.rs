//! Output generation modules for the persisted state, feeds, and index.
//!
//! This module contains submodules responsible for writing a page's
//! collected posts to their on-disk forms:
//!
//! # Submodules
//!
//! - [`json`]: Persists each page's posts as JSON, the durable record
//! - [`rss`]: Renders each page's feed XML plus its shared stylesheet
//! - [`index`]: Regenerates the overview page linking all feeds
//!
//! # Output Structure
//!
//! ```text
//! index.html
//! feed/
//! ├── rss-style.xsl
//! ├── master-concept_posts.json
//! ├── master-concept.xml
//! ├── acme-cloud_posts.json
//! └── acme-cloud.xml
//! ```

pub mod index;
pub mod json;
pub mod rss;
