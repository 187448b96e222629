/// Preset retry configurations for the stores the feed pipeline reads from
use crate::retry::RetryConfig;
use std::time::Duration;

/// Relation store reads (follow edges)
///
/// - Attempt deadline: 5s (single indexed lookup)
/// - Retry: 3 attempts, 100ms base, capped at 2s
pub fn relation_store_config() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(2),
        backoff_multiplier: 2.0,
        jitter: true,
        attempt_timeout: Some(Duration::from_secs(5)),
    }
}

/// Document store queries (ordered, membership-filtered post reads)
///
/// - Attempt deadline: 10s (ordered scans can be slow on cold indexes)
/// - Retry: 2 attempts; every chunk already degrades independently
pub fn document_store_config() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        base_delay: Duration::from_millis(200),
        max_delay: Duration::from_secs(3),
        backoff_multiplier: 2.0,
        jitter: true,
        attempt_timeout: Some(Duration::from_secs(10)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_store_config() {
        let config = relation_store_config();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.attempt_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_document_store_config() {
        let config = document_store_config();
        assert_eq!(config.max_attempts, 2);
        assert!(config.max_delay >= config.base_delay);
    }
}
