//! Retry loop: run an async remote call until success, a non-retryable error,
//! exhaustion of the policy, or cancellation.

use std::future::Future;

use super::classify;
use super::policy::{RetryDecision, RetryPolicy};
use crate::control::CancelToken;
use crate::remote::RemoteError;

/// Why a retried call did not produce a value.
#[derive(Debug)]
pub enum RetryStop {
    /// Cancellation was requested before or between attempts.
    Canceled,
    /// The last error was not retryable or the attempts ran out.
    GaveUp(RemoteError),
}

/// Runs `f` until it succeeds or the retry policy says to stop.
/// Backoff waits end early when `cancel` fires; an in-flight attempt is never interrupted.
pub async fn retry_remote<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancelToken,
    op: &'static str,
    mut f: F,
) -> Result<T, RetryStop>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut attempt = 1u32;
    loop {
        if cancel.is_canceled() {
            return Err(RetryStop::Canceled);
        }
        let err = match f().await {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        let kind = classify::classify(&err);
        match policy.decide(attempt, kind) {
            RetryDecision::NoRetry => return Err(RetryStop::GaveUp(err)),
            RetryDecision::RetryAfter(d) => {
                tracing::debug!(op, attempt, ?kind, "retrying in {:?}: {}", d, err);
                tokio::select! {
                    _ = tokio::time::sleep(d) => {}
                    _ = cancel.cancelled() => return Err(RetryStop::Canceled),
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn bad_gateway() -> RemoteError {
        RemoteError::Http {
            status: 502,
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let cancel = CancelToken::new();
        let out = retry_remote(&fast_policy(5), &cancel, "test", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(bad_gateway())
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_on_non_retryable() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let cancel = CancelToken::new();
        let res: Result<(), _> = retry_remote(&fast_policy(5), &cancel, "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::Http {
                status: 404,
                body: String::new(),
            })
        })
        .await;
        assert!(matches!(res, Err(RetryStop::GaveUp(RemoteError::Http { status: 404, .. }))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let cancel = CancelToken::new();
        let res: Result<(), _> = retry_remote(&fast_policy(3), &cancel, "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(bad_gateway())
        })
        .await;
        assert!(matches!(res, Err(RetryStop::GaveUp(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn canceled_before_first_attempt() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let res: Result<(), _> =
            retry_remote(&fast_policy(3), &cancel, "test", || async { Ok(()) }).await;
        assert!(matches!(res, Err(RetryStop::Canceled)));
    }
}
