//! Crawler module for harvesting ranked match history
//!
//! This module contains the core crawling logic, including:
//! - Sliding-window rate limiting shared by every request
//! - HTTP fetching with per-status retry policy
//! - Match ingestion (fetch, filter, transactional persistence)
//! - Overall crawl coordination over the player frontier

mod coordinator;
mod fetcher;
mod ingest;
mod rate_limiter;

pub use coordinator::{Crawler, PlayerSummary};
pub use fetcher::{
    build_http_client, FetchError, FetchErrorKind, RetryPolicy, RetryingFetcher, API_KEY_HEADER,
};
pub use ingest::{
    check_match, ingest_match, is_after_threshold, refresh_player, select_candidates,
    IngestOutcome, MatchProgress,
};
pub use rate_limiter::RateLimiter;

use crate::config::Config;
use crate::CrawlError;
use std::future::Future;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Resolve the API key and open the configured storage backend
/// 2. Build the HTTP client and the shared rate limiter
/// 3. Crawl the frontier until `shutdown` resolves or an error occurs
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `shutdown` - Future that resolves on interrupt
///
/// # Returns
///
/// * `Ok(())` - Crawl was interrupted cleanly
/// * `Err(CrawlError)` - Crawl failed
pub async fn crawl<F>(config: &Config, shutdown: F) -> Result<(), CrawlError>
where
    F: Future<Output = ()>,
{
    let mut crawler = Crawler::new(config)?;
    crawler.run_until(shutdown).await
}
