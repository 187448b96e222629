use resilience::RetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::error::{FeedError, Result};
use crate::models::MAX_MEMBERSHIP_VALUES;

/// Feed pipeline settings, read from `FEED_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    #[serde(default = "default_retry_jitter")]
    pub retry_jitter: bool,
    /// How many times a load may restart after the following set changed mid-flight
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            chunk_size: default_chunk_size(),
            store_timeout_ms: default_store_timeout_ms(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            retry_jitter: default_retry_jitter(),
            max_restarts: default_max_restarts(),
        }
    }
}

impl FeedConfig {
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine
        let _ = dotenvy::dotenv();
        Self::from_vars(std::env::vars())
    }

    /// Same as [`from_env`](Self::from_env) over an explicit variable list.
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: FeedConfig = envy::prefixed("FEED_").from_iter(vars)?;
        config.validate()
    }

    pub fn validate(mut self) -> Result<Self> {
        if self.page_size == 0 {
            return Err(FeedError::Config("FEED_PAGE_SIZE must be positive".to_string()));
        }
        if self.retry_max_attempts == 0 {
            return Err(FeedError::Config(
                "FEED_RETRY_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_MEMBERSHIP_VALUES {
            let clamped = self.chunk_size.clamp(1, MAX_MEMBERSHIP_VALUES);
            warn!(
                requested = self.chunk_size,
                clamped, "FEED_CHUNK_SIZE outside store membership limit, clamping"
            );
            self.chunk_size = clamped;
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            self.retry_max_delay_ms = self.retry_base_delay_ms;
        }
        Ok(self)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry_max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            backoff_multiplier: 2.0,
            jitter: self.retry_jitter,
            attempt_timeout: (self.store_timeout_ms > 0)
                .then(|| Duration::from_millis(self.store_timeout_ms)),
        }
    }
}

fn default_page_size() -> usize {
    20
}

fn default_chunk_size() -> usize {
    MAX_MEMBERSHIP_VALUES
}

fn default_store_timeout_ms() -> u64 {
    5_000
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2_000
}

fn default_retry_jitter() -> bool {
    true
}

fn default_max_restarts() -> u32 {
    3
}
