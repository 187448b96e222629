/// Deadline wrapper for fallible async operations
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Marker error produced when an attempt outlives its deadline.
///
/// Callers convert it into their own error type through `From<Elapsed>`, so a
/// timed-out attempt flows through the same retry predicate as any other failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline of {0:?} elapsed")]
pub struct Elapsed(pub Duration);

/// Run `future`, failing with `E::from(Elapsed)` if it is still pending after `deadline`.
///
/// `None` disables the deadline entirely.
pub async fn with_deadline<F, T, E>(deadline: Option<Duration>, future: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<Elapsed>,
{
    match deadline {
        Some(duration) => match timeout(duration, future).await {
            Ok(result) => result,
            Err(_) => Err(E::from(Elapsed(duration))),
        },
        None => future.await,
    }
}
