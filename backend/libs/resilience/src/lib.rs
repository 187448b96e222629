/// Resilience primitives for store calls
///
/// This library provides the retry machinery shared by every store-facing
/// component of the feed pipeline:
/// - **Retry**: Exponential backoff with jitter, gated by a retryable-error predicate
/// - **Deadline**: Optional per-attempt time limit
/// - **Preset Configurations**: Pre-tuned settings for the relation and document stores
///
/// # Example: Retrying a flaky read
///
/// ```rust,no_run
/// use resilience::{presets, Elapsed, RetryPolicy};
///
/// #[derive(Debug)]
/// enum ReadError {
///     Busy,
///     TimedOut,
/// }
///
/// impl std::fmt::Display for ReadError {
///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
///         write!(f, "{:?}", self)
///     }
/// }
///
/// impl From<Elapsed> for ReadError {
///     fn from(_: Elapsed) -> Self {
///         ReadError::TimedOut
///     }
/// }
///
/// #[tokio::main]
/// async fn main() {
///     let policy = RetryPolicy::new(presets::document_store_config(), |e: &ReadError| {
///         matches!(e, ReadError::Busy | ReadError::TimedOut)
///     });
///
///     let result = policy
///         .run("read_profile", || async { Ok::<_, ReadError>(42) })
///         .await;
/// }
/// ```

pub mod presets;
pub mod retry;
pub mod timeout;

// Re-export main types for convenience
pub use presets::{document_store_config, relation_store_config};
pub use retry::{RetryConfig, RetryError, RetryPolicy};
pub use timeout::{with_deadline, Elapsed};
