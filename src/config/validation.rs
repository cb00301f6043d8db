use crate::config::types::{
    ApiConfig, Config, CrawlConfig, RateLimitConfig, RetryConfig, StorageBackend, StorageConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_retry_config(&config.retry)?;
    validate_crawl_config(&config.crawl)?;
    validate_storage_config(&config.storage)?;
    Ok(())
}

/// Validates upstream API configuration
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    validate_base_url("platform_url", &config.platform_url)?;
    validate_base_url("regional_url", &config.regional_url)?;

    if config.match_page_size < 1 || config.match_page_size > 100 {
        return Err(ConfigError::Validation(format!(
            "match_page_size must be between 1 and 100, got {}",
            config.match_page_size
        )));
    }

    if config.api_key.is_none() && config.api_key_env.trim().is_empty() {
        return Err(ConfigError::Validation(
            "api_key_env cannot be empty when api_key is not set".to_string(),
        ));
    }

    Ok(())
}

/// Validates an API base URL: must parse and use http(s)
fn validate_base_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} must use http or https, got '{}'",
            field, value
        )));
    }

    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidUrl(format!(
            "{} cannot be used as a base URL: '{}'",
            field, value
        )));
    }

    Ok(())
}

/// Validates the sliding-window budget
fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    if config.max_requests < 1 {
        return Err(ConfigError::Validation(format!(
            "max_requests must be >= 1, got {}",
            config.max_requests
        )));
    }

    if config.window_seconds < 1 {
        return Err(ConfigError::Validation(format!(
            "window_seconds must be >= 1, got {}",
            config.window_seconds
        )));
    }

    Ok(())
}

/// Validates retry configuration
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    Ok(())
}

/// Validates crawl selection settings
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.queue_type.trim().is_empty() {
        return Err(ConfigError::Validation(
            "queue_type cannot be empty".to_string(),
        ));
    }

    if config.min_duration_secs < 0 {
        return Err(ConfigError::Validation(format!(
            "min_duration_secs must be >= 0, got {}",
            config.min_duration_secs
        )));
    }

    if config.min_match_id.is_some() && config.region_prefix.is_empty() {
        return Err(ConfigError::Validation(
            "region_prefix is required when min_match_id is set".to_string(),
        ));
    }

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.path.trim().is_empty() {
        return Err(ConfigError::Validation("path cannot be empty".to_string()));
    }

    if config.backend == StorageBackend::Sqlite && !config.transactions {
        return Err(ConfigError::Validation(
            "transactions can only be disabled for the document backend".to_string(),
        ));
    }

    Ok(())
}
