//! Output module for crawl reports
//!
//! This module handles reading aggregate counts back out of the store and
//! printing them for the `--stats` command.

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};
