//! Centralized configuration for the reference-data layer.
//!
//! Grouped constants hold the defaults; [`ClientSettings`] is the serde-loadable
//! form the binary reads from disk and converts into runtime configs.

use crate::cache::CacheConfig;
use crate::error::{RefDataError, Result};
use crate::network::RetryConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    pub const USER_AGENT: &'static str = "refdata-core/0.3";
    pub const DEFAULT_BASE_URL: &'static str = "http://127.0.0.1:8080";
}

/// Cache defaults.
pub struct CacheDefaults;

impl CacheDefaults {
    pub const TTL: Duration = Duration::from_secs(300);
    pub const MAX_ENTRIES: usize = 500;
}

/// Retry defaults for read operations.
pub struct RetryDefaults;

impl RetryDefaults {
    pub const MAX_RETRIES: u32 = 3;
    pub const BASE_DELAY: Duration = Duration::from_secs(1);
    pub const MULTIPLIER: f64 = 2.0;
    pub const MAX_DELAY: Duration = Duration::from_secs(30);
    pub const RETRYABLE_STATUSES: [u16; 4] = [500, 502, 503, 504];
}

/// Search defaults.
pub struct SearchDefaults;

impl SearchDefaults {
    pub const DEBOUNCE: Duration = Duration::from_millis(300);
    pub const PAGE_SIZE: u32 = 20;
}

/// File-loadable client settings.
///
/// Durations are expressed in milliseconds on the wire. Every field has a
/// default, so an empty JSON object is a valid settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub cache_ttl_ms: u64,
    pub cache_max_entries: usize,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Upper bound for a single backoff wait; `None` leaves it unbounded.
    pub max_delay_ms: Option<u64>,
    pub retryable_statuses: BTreeSet<u16>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: NetworkConfig::DEFAULT_BASE_URL.to_string(),
            request_timeout_ms: NetworkConfig::REQUEST_TIMEOUT.as_millis() as u64,
            cache_ttl_ms: CacheDefaults::TTL.as_millis() as u64,
            cache_max_entries: CacheDefaults::MAX_ENTRIES,
            max_retries: RetryDefaults::MAX_RETRIES,
            base_delay_ms: RetryDefaults::BASE_DELAY.as_millis() as u64,
            backoff_multiplier: RetryDefaults::MULTIPLIER,
            max_delay_ms: Some(RetryDefaults::MAX_DELAY.as_millis() as u64),
            retryable_statuses: RetryDefaults::RETRYABLE_STATUSES.into_iter().collect(),
        }
    }
}

impl ClientSettings {
    /// Load settings from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| RefDataError::Config {
            message: format!("Failed to read settings {}: {}", path.display(), e),
        })?;
        let settings: Self = serde_json::from_str(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(RefDataError::Config {
                message: format!(
                    "backoffMultiplier must be >= 1, got {}",
                    self.backoff_multiplier
                ),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(RefDataError::Config {
                message: "requestTimeoutMs must be greater than 0".to_string(),
            });
        }
        if self.cache_max_entries == 0 {
            return Err(RefDataError::Config {
                message: "cacheMaxEntries must be at least 1".to_string(),
            });
        }
        url::Url::parse(&self.base_url).map_err(|e| RefDataError::InvalidUrl {
            url: self.base_url.clone(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            retryable_statuses: self.retryable_statuses.iter().copied().collect(),
            max_delay: self.max_delay_ms.map(Duration::from_millis),
            jitter: false,
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            default_ttl: Duration::from_millis(self.cache_ttl_ms),
            max_entries: self.cache_max_entries,
        }
    }
}
