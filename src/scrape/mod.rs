//! Turning rendered feed markup into posts.
//!
//! The stages run in a fixed order for each rendered item: [`resolve`]
//! finds the post's permalink and timestamp, [`extract`] pulls its text
//! and images, and [`engine`] drives the loop, using [`boundary`] to know
//! where the previous run left off.

pub mod boundary;
pub mod engine;
pub mod extract;
pub mod resolve;

pub use boundary::read_high_water_mark;
pub use engine::{scrape_page, ScrapeContext};
