use serde::Deserialize;

/// Main configuration structure for Rank-Crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(rename = "rate-limit", default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    pub storage: StorageConfig,
}

/// Upstream API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API key; when absent it is read from `api_key_env`
    #[serde(rename = "api-key", default)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(rename = "api-key-env", default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of the platform host serving rank entries (e.g. na1)
    #[serde(rename = "platform-url")]
    pub platform_url: String,

    /// Base URL of the regional host serving match data (e.g. americas)
    #[serde(rename = "regional-url")]
    pub regional_url: String,

    /// Number of match IDs requested per player scan
    #[serde(rename = "match-page-size", default = "default_match_page_size")]
    pub match_page_size: u32,
}

impl ApiConfig {
    /// Returns the configured API key, falling back to the environment
    pub fn resolve_api_key(&self) -> Result<String, crate::ConfigError> {
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.trim().to_string());
        }

        std::env::var(&self.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| crate::ConfigError::MissingApiKey(self.api_key_env.clone()))
    }
}

/// Sliding-window request budget
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests allowed inside one window
    #[serde(rename = "max-requests", default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in seconds
    #[serde(rename = "window-seconds", default = "default_window_seconds")]
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_seconds: default_window_seconds(),
        }
    }
}

/// Retry behavior of the fetch layer
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Attempts per logical request, including the first
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Wait before retrying a 404 (seconds)
    #[serde(rename = "not-found-cooldown-secs", default = "default_not_found_cooldown")]
    pub not_found_cooldown_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            not_found_cooldown_secs: default_not_found_cooldown(),
        }
    }
}

/// Crawl selection and match filtering
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// Ranked queue whose players form the crawl frontier
    #[serde(rename = "queue-type", default = "default_queue_type")]
    pub queue_type: String,

    /// Queue id a match must have to be ingested
    #[serde(rename = "queue-id", default = "default_queue_id")]
    pub queue_id: i64,

    /// Matches at or below this duration (seconds) are skipped
    #[serde(rename = "min-duration-secs", default = "default_min_duration")]
    pub min_duration_secs: i64,

    /// Region prefix of match IDs (e.g. "NA1_")
    #[serde(rename = "region-prefix", default = "default_region_prefix")]
    pub region_prefix: String,

    /// Only match IDs with a numeric suffix above this value are considered
    #[serde(rename = "min-match-id", default)]
    pub min_match_id: Option<u64>,

    /// Player identifier used upstream for bots
    #[serde(rename = "bot-player-id", default = "default_bot_player_id")]
    pub bot_player_id: String,

    /// Pause before reselecting an empty frontier (seconds)
    #[serde(rename = "idle-secs", default = "default_idle_secs")]
    pub idle_secs: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            queue_type: default_queue_type(),
            queue_id: default_queue_id(),
            min_duration_secs: default_min_duration(),
            region_prefix: default_region_prefix(),
            min_match_id: None,
            bot_player_id: default_bot_player_id(),
            idle_secs: default_idle_secs(),
        }
    }
}

/// Which persistence backend to open at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Relational store (SQLite)
    Sqlite,
    /// Document store persisted as a JSON file
    Document,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Path to the database (sqlite) or collection file (document)
    pub path: String,

    /// Whether the backend provides multi-document transactions
    #[serde(default = "default_transactions")]
    pub transactions: bool,
}

fn default_api_key_env() -> String {
    "RIOT_API_KEY".to_string()
}

fn default_match_page_size() -> u32 {
    100
}

fn default_max_requests() -> u32 {
    100
}

fn default_window_seconds() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    3
}

fn default_not_found_cooldown() -> u64 {
    15
}

fn default_queue_type() -> String {
    "RANKED_SOLO_5x5".to_string()
}

fn default_queue_id() -> i64 {
    420
}

fn default_min_duration() -> i64 {
    500
}

fn default_region_prefix() -> String {
    "NA1_".to_string()
}

fn default_bot_player_id() -> String {
    "BOT".to_string()
}

fn default_idle_secs() -> u64 {
    60
}

fn default_transactions() -> bool {
    true
}
