//! Bounded retry with exponential backoff
//!
//! Generic wrapper applied per network call. This is not a queue-level
//! policy: each record also persists its own `attempt_count` and next-attempt
//! time so retries survive process restarts.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Failure classification hook for [`execute`]
pub trait Retryable {
    /// Whether another attempt could plausibly succeed
    fn is_retryable(&self) -> bool;
}

/// Bounded exponential backoff schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            multiplier: 2,
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the given attempt (1-based); the first attempt runs
    /// immediately
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(2).min(16);
        let factor = u32::try_from(u64::from(self.multiplier).saturating_pow(exponent))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Terminal outcome of an exhausted or non-retryable operation
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The last retryable error after `max_attempts` tries
    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
    /// Returned immediately without consuming remaining attempts
    #[error("non-retryable failure: {0}")]
    NonRetryable(E),
}

/// A successful operation result plus the attempts it took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOutcome<T> {
    pub value: T,
    pub attempts: u32,
}

/// Run `operation` under `policy`, sleeping the computed backoff between
/// retryable failures
pub async fn execute<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<RetryOutcome<T>, RetryError<E>>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);

    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(RetryOutcome { value, attempts: attempt }),
            Err(error) if !error.is_retryable() => {
                return Err(RetryError::NonRetryable(error));
            }
            Err(error) if attempt >= max_attempts => {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }
            Err(error) => {
                let delay = policy.delay_for(attempt + 1);
                tracing::debug!(attempt, ?delay, %error, "retrying after backoff");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct FakeError {
        retryable: bool,
    }

    impl std::fmt::Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("fake failure")
        }
    }

    impl Retryable for FakeError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            multiplier: 2,
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_delay_schedule_is_exponential_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::ZERO);
        assert_eq!(policy.delay_for(2), Duration::from_millis(500));
        assert_eq!(policy.delay_for(3), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(10), Duration::from_secs(8));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_succeeds_on_last_allowed_attempt() {
        let calls = AtomicU32::new(0);

        let outcome = execute(&fast_policy(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(FakeError { retryable: true })
                } else {
                    Ok("done")
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(outcome.value, "done");
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_exhausts_retry_budget() {
        let calls = AtomicU32::new(0);

        let error = execute::<(), _, _, _>(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FakeError { retryable: true }) }
        })
        .await
        .unwrap_err();

        assert!(matches!(error, RetryError::Exhausted { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_non_retryable_returns_immediately() {
        let calls = AtomicU32::new(0);

        let error = execute::<(), _, _, _>(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FakeError { retryable: false }) }
        })
        .await
        .unwrap_err();

        assert!(matches!(error, RetryError::NonRetryable(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
