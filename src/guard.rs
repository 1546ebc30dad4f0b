//! Timeout / cancellation guard.
//!
//! Every `query`/`query_stream` invocation runs under [`with_deadline`]: a
//! deadline timer starts at call time with the configured tolerance, and the
//! guarded future races against it and against the request's cancellation
//! token. If the timer fires first, the token is cancelled (so the in-flight
//! transport aborts within one I/O operation) and the caller resolves with
//! [`Error::Timeout`]. Explicit cancellation (e.g. a client disconnect
//! driving the same token) is equivalent and idempotent.
//!
//! Completion through any branch drops the other branches, so no timer
//! outlives the request and no late-arriving transport data is ever
//! delivered.

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Drive `fut` to completion under a deadline and a cancellation token.
///
/// Returns the future's own outcome if it finishes first; `Error::Timeout`
/// if the tolerance elapses or the token is cancelled first.
pub async fn with_deadline<F, T>(
    tolerance: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        outcome = fut => outcome,
        _ = cancel.cancelled() => Err(Error::Timeout),
        _ = tokio::time::sleep(tolerance) => {
            // Abort the in-flight transport; cancel() is idempotent
            cancel.cancel();
            Err(Error::Timeout)
        }
    }
}

/// Race a non-fallible future against a cancellation token.
///
/// Used by the transport around individual suspension points (connect, body
/// read) so cancellation is observed within one I/O operation's latency.
pub async fn checked<F, T>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        out = fut => Ok(out),
        _ = cancel.cancelled() => Err(Error::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_completion_before_deadline() {
        let cancel = CancellationToken::new();
        let result = with_deadline(Duration::from_secs(1), &cancel, async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_deadline_expiry_cancels_token() {
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let result: Result<()> = with_deadline(
            Duration::from_millis(50),
            &cancel,
            futures::future::pending(),
        )
        .await;

        assert!(matches!(result, Err(Error::Timeout)));
        assert!(cancel.is_cancelled());
        // Bounded margin: well under 100ms for a 50ms tolerance
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_explicit_cancellation_is_equivalent() {
        let cancel = CancellationToken::new();
        let signal = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            signal.cancel();
        });

        let result: Result<()> = with_deadline(
            Duration::from_secs(60),
            &cancel,
            futures::future::pending(),
        )
        .await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_resolves_immediately() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        cancel.cancel(); // idempotent

        let result: Result<()> = with_deadline(
            Duration::from_secs(60),
            &cancel,
            futures::future::pending(),
        )
        .await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn test_inner_error_propagates() {
        let cancel = CancellationToken::new();
        let result: Result<()> = with_deadline(Duration::from_secs(1), &cancel, async {
            Err(Error::upstream("boom"))
        })
        .await;
        assert!(matches!(result, Err(Error::Upstream(_))));
    }

    #[tokio::test]
    async fn test_checked_observes_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = checked(&cancel, futures::future::pending::<()>()).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn test_checked_passes_value_through() {
        let cancel = CancellationToken::new();
        let result = checked(&cancel, async { "ok" }).await;
        assert_eq!(result.unwrap(), "ok");
    }
}
