//! Runtime configuration.
//!
//! Every field has a default so a partial JSON document (or none at all) is enough.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::sched::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    /// How long a committed correlation id suppresses its echo.
    pub dedup_ttl_ms: u64,
    pub sweep_interval_ms: u64,
    pub default_timeout_ms: u64,
    pub default_priority: i32,
    pub retry: RetryConfig,
    pub feed: FeedConfig,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            dedup_ttl_ms: 10_000,
            sweep_interval_ms: 1_000,
            default_timeout_ms: 15_000,
            default_priority: 0,
            retry: RetryConfig::default(),
            feed: FeedConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total network attempts including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            multiplier: 2.0,
            max_delay_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            reconnect_base_ms: 500,
            reconnect_max_ms: 30_000,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl CourierConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be >= 1".into()));
        }
        if self.dedup_ttl_ms == 0 {
            return Err(ConfigError::Invalid("dedup_ttl_ms must be > 0".into()));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid("sweep_interval_ms must be > 0".into()));
        }
        if !(self.retry.multiplier >= 1.0) {
            return Err(ConfigError::Invalid("retry.multiplier must be >= 1.0".into()));
        }
        Ok(())
    }

    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_millis(self.dedup_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            multiplier: self.retry.multiplier,
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    /// Backoff used between event feed reconnects (unbounded attempts).
    pub fn reconnect_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: u32::MAX,
            base_delay: Duration::from_millis(self.feed.reconnect_base_ms),
            multiplier: 2.0,
            max_delay: Duration::from_millis(self.feed.reconnect_max_ms),
        }
    }
}
