/// Error types for feed-aggregator
use std::time::Duration;
use thiserror::Error;

/// Failures a store backend may report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The backend refused an ordered/filtered query it has no index for.
    #[error("Missing index: {0}")]
    MissingIndex(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

impl From<resilience::Elapsed> for StoreError {
    fn from(e: resilience::Elapsed) -> Self {
        StoreError::Timeout(e.0)
    }
}

impl From<resilience::RetryError<StoreError>> for StoreError {
    fn from(e: resilience::RetryError<StoreError>) -> Self {
        e.into_inner()
    }
}

/// Errors surfaced to callers of the feed pipeline.
///
/// Data-shape problems never show up here; they degrade to empty or partial pages.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment error: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for feed operations
pub type Result<T> = std::result::Result<T, FeedError>;
