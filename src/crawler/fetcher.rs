//! HTTP fetcher implementation
//!
//! This module handles all upstream requests for the crawler, including:
//! - Building the HTTP client with the API key header
//! - Gating every attempt through the shared [`RateLimiter`]
//! - Status-code driven retry logic
//! - Error classification

use crate::config::{RateLimitConfig, RetryConfig};
use crate::crawler::RateLimiter;
use crate::{ConfigError, CrawlError};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "X-Riot-Token";

/// Errors surfaced by a logical fetch
///
/// `Transport`, `RateLimited` and `NotFound` are retried internally and only
/// reach callers wrapped in `Exhausted`.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Rate limited by upstream for {url}")]
    RateLimited { url: String },

    #[error("Resource not found: {url}")]
    NotFound { url: String },

    #[error("Unauthorized request to {url} (invalid or expired API key)")]
    Unauthorized { url: String },

    #[error("HTTP {status} from {url}")]
    Upstream { url: String, status: u16 },

    #[error("Gave up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: Box<FetchError>,
    },

    #[error("Invalid JSON from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Coarse classification of a [`FetchError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    Transport,
    RateLimited,
    NotFound,
    Unauthorized,
    Upstream,
    Exhausted,
    Decode,
}

impl FetchError {
    /// Returns the classification of this error
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Transport { .. } => FetchErrorKind::Transport,
            Self::RateLimited { .. } => FetchErrorKind::RateLimited,
            Self::NotFound { .. } => FetchErrorKind::NotFound,
            Self::Unauthorized { .. } => FetchErrorKind::Unauthorized,
            Self::Upstream { .. } => FetchErrorKind::Upstream,
            Self::Exhausted { .. } => FetchErrorKind::Exhausted,
            Self::Decode { .. } => FetchErrorKind::Decode,
        }
    }

    /// For `Exhausted`, the error of the final attempt; otherwise `self`
    pub fn last_failure(&self) -> &FetchError {
        match self {
            Self::Exhausted { last, .. } => last,
            other => other,
        }
    }

    /// HTTP status behind this error, if any
    pub fn status(&self) -> Option<u16> {
        match self.last_failure() {
            Self::RateLimited { .. } => Some(429),
            Self::NotFound { .. } => Some(404),
            Self::Unauthorized { .. } => Some(401),
            Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Retry budget and cooldowns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per logical request, including the first
    pub max_attempts: u32,

    /// Wait before retrying a 404
    pub not_found_cooldown: Duration,

    /// Wait before retrying a 429
    pub rate_limited_cooldown: Duration,
}

impl RetryPolicy {
    /// Builds the policy from configuration
    ///
    /// The 429 cooldown is half the rate-limit window.
    pub fn from_config(retry: &RetryConfig, rate_limit: &RateLimitConfig) -> Self {
        Self {
            max_attempts: retry.max_attempts,
            not_found_cooldown: Duration::from_secs(retry.not_found_cooldown_secs),
            rate_limited_cooldown: Duration::from_secs(rate_limit.window_seconds) / 2,
        }
    }

    /// Cooldown before retrying after `error`, or `None` when it is not retryable
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Transport failure | Retry immediately |
    /// | HTTP 502 / 403 | Retry immediately |
    /// | HTTP 404 | Retry after `not_found_cooldown` |
    /// | HTTP 429 | Retry after `rate_limited_cooldown` |
    /// | HTTP 401, other statuses, bad JSON | Fail |
    pub fn retry_delay(&self, error: &FetchError) -> Option<Duration> {
        match error {
            FetchError::Transport { .. } => Some(Duration::ZERO),
            FetchError::Upstream { status, .. } if *status == 502 || *status == 403 => {
                Some(Duration::ZERO)
            }
            FetchError::NotFound { .. } => Some(self.not_found_cooldown),
            FetchError::RateLimited { .. } => Some(self.rate_limited_cooldown),
            _ => None,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            not_found_cooldown: Duration::from_secs(15),
            rate_limited_cooldown: Duration::from_secs(60),
        }
    }
}

/// Builds an HTTP client carrying the API key on every request
///
/// # Arguments
///
/// * `api_key` - The upstream API key
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(CrawlError)` - The key is not a valid header value or the client failed to build
pub fn build_http_client(api_key: &str) -> Result<Client, CrawlError> {
    let mut key = HeaderValue::from_str(api_key).map_err(|_| {
        ConfigError::Validation("API key contains characters not allowed in a header".to_string())
    })?;
    key.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(API_KEY_HEADER, key);

    let client = Client::builder()
        .user_agent(concat!("rank-crawler/", env!("CARGO_PKG_VERSION")))
        .default_headers(headers)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()?;

    Ok(client)
}

/// Issues logical requests with rate limiting and retries
pub struct RetryingFetcher {
    client: Client,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    /// Creates a fetcher sharing `limiter` with any other fetcher of the process
    pub fn new(client: Client, limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Self {
        Self {
            client,
            limiter,
            policy,
        }
    }

    /// Builds a fetcher and its limiter from configuration
    pub fn from_config(
        api_key: &str,
        rate_limit: &RateLimitConfig,
        retry: &RetryConfig,
    ) -> Result<Self, CrawlError> {
        let client = build_http_client(api_key)?;
        let limiter = Arc::new(RateLimiter::from_config(rate_limit));
        Ok(Self::new(
            client,
            limiter,
            RetryPolicy::from_config(retry, rate_limit),
        ))
    }

    /// The limiter gating this fetcher
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// The retry policy in effect
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches `url` and decodes the body as JSON
    ///
    /// Each attempt first passes the rate limiter. Retryable failures are
    /// retried up to the attempt budget, then surfaced as `Exhausted`.
    pub async fn fetch(&self, url: &Url) -> Result<Value, FetchError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.limiter.admit().await;

            let error = match self.attempt(url).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let Some(cooldown) = self.policy.retry_delay(&error) else {
                tracing::debug!("Not retrying {}: {}", url, error);
                return Err(error);
            };

            if attempt >= max_attempts {
                return Err(FetchError::Exhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    last: Box::new(error),
                });
            }

            tracing::warn!(
                "Attempt {}/{} failed: {} (retrying in {:?})",
                attempt,
                max_attempts,
                error,
                cooldown
            );

            if !cooldown.is_zero() {
                tokio::time::sleep(cooldown).await;
            }
        }
    }

    /// Performs one GET and classifies the outcome
    async fn attempt(&self, url: &Url) -> Result<Value, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| transport_error(url, &e))?;

        let status = response.status();
        if status.is_success() {
            let body = response
                .bytes()
                .await
                .map_err(|e| transport_error(url, &e))?;
            return serde_json::from_slice(&body).map_err(|e| FetchError::Decode {
                url: url.to_string(),
                message: e.to_string(),
            });
        }

        let url = url.to_string();
        Err(match status {
            StatusCode::UNAUTHORIZED => FetchError::Unauthorized { url },
            StatusCode::NOT_FOUND => FetchError::NotFound { url },
            StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited { url },
            other => FetchError::Upstream {
                url,
                status: other.as_u16(),
            },
        })
    }
}

/// Classifies a reqwest failure as a transport error
fn transport_error(url: &Url, error: &reqwest::Error) -> FetchError {
    let message = if error.is_timeout() {
        "Request timeout".to_string()
    } else if error.is_connect() {
        "Connection refused".to_string()
    } else {
        error.to_string()
    };

    FetchError::Transport {
        url: url.to_string(),
        message,
    }
}
