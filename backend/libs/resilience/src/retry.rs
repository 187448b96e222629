/// Retry policy with exponential backoff, jitter and a retryable-error predicate
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::timeout::{with_deadline, Elapsed};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one (1 disables retries)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Add random jitter to backoff (±30%)
    pub jitter: bool,
    /// Deadline applied to each attempt individually
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
            attempt_timeout: None,
        }
    }
}

impl RetryConfig {
    /// Delay to wait after the given failed attempt (1-based), before jitter.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("{operation} failed after {attempts} attempts: {last}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last: E,
    },
    #[error("{operation} failed with a non-retryable error: {error}")]
    Permanent { operation: String, error: E },
}

impl<E> RetryError<E> {
    /// The error returned by the final attempt.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Permanent { error, .. } => error,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Permanent { .. } => 1,
        }
    }
}

/// A reusable retry policy: backoff settings plus the rule deciding which
/// errors are worth another attempt.
///
/// One policy is built by the composition root and shared by every component
/// that talks to a store.
pub struct RetryPolicy<E> {
    config: RetryConfig,
    retryable: Arc<dyn Fn(&E) -> bool + Send + Sync>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            retryable: Arc::clone(&self.retryable),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<E> RetryPolicy<E> {
    pub fn new<P>(config: RetryConfig, retryable: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            config,
            retryable: Arc::new(retryable),
        }
    }

    /// Single attempt, no backoff.
    pub fn never() -> Self {
        Self::new(
            RetryConfig {
                max_attempts: 1,
                ..Default::default()
            },
            |_| false,
        )
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn is_retryable(&self, error: &E) -> bool {
        (self.retryable)(error)
    }

    /// Execute `f` until it succeeds, returns a non-retryable error, or the
    /// attempt budget is spent.
    pub async fn run<F, Fut, T>(&self, operation: &str, mut f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<Elapsed> + fmt::Display,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match with_deadline(self.config.attempt_timeout, f()).await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Operation recovered after retry");
                    }
                    return Ok(result);
                }
                Err(e) => e,
            };

            if !self.is_retryable(&error) {
                return Err(RetryError::Permanent {
                    operation: operation.to_string(),
                    error,
                });
            }

            if attempt >= max_attempts {
                warn!(operation, attempts = attempt, error = %error, "Max attempts reached");
                return Err(RetryError::Exhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = apply_jitter(self.config.backoff_for(attempt), self.config.jitter);

            warn!(
                operation,
                attempt,
                max_attempts,
                error = %error,
                "Retrying after {:?}",
                delay
            );

            tokio::time::sleep(delay).await;
        }
    }
}

fn apply_jitter(base: Duration, jitter: bool) -> Duration {
    if jitter {
        let jitter_factor = 1.0 + rand::thread_rng().gen_range(-0.3..0.3); // ±30%
        Duration::from_millis((base.as_millis() as f64 * jitter_factor) as u64)
    } else {
        base
    }
}
