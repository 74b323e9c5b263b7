//! Retry driver applying a [`BackoffPolicy`] to an async remote call

use crate::backoff::{BackoffDecision, BackoffPolicy, StopReason};
use scribe_core::{LogContext, ResilienceEvent, ScribeError};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Terminal failure of a retried call
#[derive(Error, Debug)]
#[error("{operation} failed after {attempts} attempt(s) ({reason}): {last_error}")]
pub struct RetryExhausted {
    pub operation: String,
    pub attempts: u32,
    pub reason: StopReason,
    pub last_error: ScribeError,
}

/// Value of a retried call and the attempt that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

/// Run `f` until it succeeds or the policy says stop
///
/// Each attempt is bounded by `call_timeout`; an attempt that runs out of time
/// fails with [`ScribeError::Timeout`], which the default policy retries.
/// Between attempts the task sleeps without blocking the runtime. Individual
/// attempt failures are only logged; the caller sees the final outcome.
///
/// # Usage
///
/// ```no_run
/// use scribe_agent::{retry_with_backoff, BackoffPolicy};
/// use scribe_core::Result;
/// use std::time::Duration;
///
/// async fn fetch() -> Result<String> {
///     Ok("data".to_string())
/// }
///
/// async fn example() {
///     let policy = BackoffPolicy::default();
///     let result = retry_with_backoff(&policy, "fetch", Some(Duration::from_secs(30)), fetch).await;
/// }
/// ```
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &BackoffPolicy,
    operation: &str,
    call_timeout: Option<Duration>,
    f: F,
) -> Result<Retried<T>, RetryExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = scribe_core::Result<T>>,
{
    retry_on_circuit(policy, operation, operation, call_timeout, f).await
}

/// [`retry_with_backoff`] for a call guarded by the breaker named `circuit`
///
/// Retry events carry `circuit` and `operation` as separate fields, so they
/// line up with the breaker's own events.
pub async fn retry_on_circuit<F, Fut, T>(
    policy: &BackoffPolicy,
    circuit: &str,
    operation: &str,
    call_timeout: Option<Duration>,
    mut f: F,
) -> Result<Retried<T>, RetryExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = scribe_core::Result<T>>,
{
    let mut attempt: u32 = 1;
    loop {
        let outcome = match call_timeout {
            Some(limit) => match tokio::time::timeout(limit, f()).await {
                Ok(result) => result,
                Err(_) => Err(ScribeError::Timeout(limit)),
            },
            None => f().await,
        };

        let error = match outcome {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(
                        circuit,
                        operation,
                        attempt,
                        "{} succeeded after {} attempts",
                        operation,
                        attempt
                    );
                }
                return Ok(Retried {
                    value,
                    attempts: attempt,
                });
            }
            Err(e) => e,
        };

        match policy.decide(attempt, &error) {
            BackoffDecision::Retry(delay) => {
                LogContext::new(circuit, ResilienceEvent::Retry)
                    .operation(operation)
                    .attempt(attempt)
                    .delay(delay)
                    .error(&error)
                    .emit();
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            BackoffDecision::Stop(reason) => {
                LogContext::new(circuit, ResilienceEvent::GaveUp)
                    .operation(operation)
                    .attempt(attempt)
                    .error(&error)
                    .emit();
                return Err(RetryExhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    reason,
                    last_error: error,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::ErrorKind;
    use tokio::time::Instant;

    fn no_jitter() -> BackoffPolicy {
        BackoffPolicy::new(3, Duration::from_secs(1), Duration::from_secs(30)).with_jitter(false)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try() {
        let mut attempts = 0;
        let result = retry_with_backoff(&no_jitter(), "test_op", None, || {
            attempts += 1;
            async move { Ok::<_, ScribeError>(42) }
        })
        .await;

        let retried = result.unwrap();
        assert_eq!(retried.value, 42);
        assert_eq!(retried.attempts, 1);
        assert_eq!(attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failures() {
        let mut attempts = 0;
        let result = retry_with_backoff(&no_jitter(), "test_op", None, || {
            attempts += 1;
            async move {
                if attempts < 3 {
                    Err(ScribeError::ServiceUnavailable("503".to_string()))
                } else {
                    Ok(attempts)
                }
            }
        })
        .await;

        let retried = result.unwrap();
        assert_eq!(retried.value, 3);
        assert_eq!(retried.attempts, 3);
        assert_eq!(attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_retries() {
        let start = Instant::now();
        let mut attempts = 0;
        let result = retry_with_backoff(&no_jitter(), "test_op", None, || {
            attempts += 1;
            async move { Err::<(), _>(ScribeError::RateLimited("429".to_string())) }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(attempts, 4);
        assert_eq!(err.attempts, 4);
        assert_eq!(err.reason, StopReason::Exhausted);
        assert_eq!(err.last_error.kind(), ErrorKind::RateLimited);
        // 1s + 2s + 4s of backoff
        assert!(start.elapsed() >= Duration::from_secs(7));
        assert!(err.to_string().contains("failed after 4 attempt(s)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_not_retried() {
        let mut attempts = 0;
        let result = retry_with_backoff(&no_jitter(), "test_op", None, || {
            attempts += 1;
            async move { Err::<(), _>(ScribeError::Auth("revoked".to_string())) }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(attempts, 1);
        assert_eq!(err.reason, StopReason::NonRetriable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_times_out_and_retries() {
        let mut attempts = 0;
        let result = retry_with_backoff(
            &no_jitter(),
            "test_op",
            Some(Duration::from_secs(5)),
            || {
                attempts += 1;
                let current = attempts;
                async move {
                    if current == 1 {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                    }
                    Ok::<_, ScribeError>(current)
                }
            },
        )
        .await;

        assert_eq!(
            result.unwrap(),
            Retried {
                value: 2,
                attempts: 2
            }
        );
        assert_eq!(attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_timeout_reports_timeout() {
        let result = retry_with_backoff(
            &no_jitter(),
            "test_op",
            Some(Duration::from_millis(100)),
            || async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, ScribeError>(())
            },
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 4);
        assert!(matches!(err.last_error, ScribeError::Timeout(d) if d == Duration::from_millis(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_and_operation_names_kept_apart() {
        let result = retry_on_circuit(&no_jitter(), "youtube_script", "create_script", None, || async {
            Err::<(), _>(ScribeError::Auth("revoked".to_string()))
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.operation, "create_script");
        assert!(err.to_string().starts_with("create_script failed"));
    }
}
