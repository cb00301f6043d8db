//! Rank-Crawler: a ranked match-history harvester
//!
//! This crate continuously walks a population of players from a rate-limited
//! game-data API, ingesting their ranked matches and rank standings into a
//! local store so analysis can run against a consistent snapshot.

pub mod api;
pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Rank-Crawler operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Unexpected payload for {context}: {source}")]
    Payload {
        context: String,
        source: serde_json::Error,
    },

    #[error("Invalid match state transition for {match_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        match_id: String,
        from: state::MatchState,
        to: state::MatchState,
    },

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("No API key: set `api-key` or the {0} environment variable")]
    MissingApiKey(String),
}

/// Result type alias for Rank-Crawler operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use api::{MatchPayload, RankEntry, RiotApi};
pub use config::Config;
pub use crawler::{Crawler, FetchError, RateLimiter, RetryingFetcher};
pub use state::{MatchState, SkipReason};
pub use storage::{Storage, Transaction};
