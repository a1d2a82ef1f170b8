//! Explicit retry policy with exponential backoff.
//!
//! Remote calls that can fail transiently (timeouts, rate limits,
//! server errors) are wrapped in a [`RetryPolicy`] plus a
//! retryable-error predicate, rather than baking the loop into each
//! client. Defaults match the embedding contract: 3 attempts,
//! exponential backoff starting at 4s, capped at 10s.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Why a retried operation ultimately failed.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The error was not retryable; no further attempts were made.
    Permanent { attempts: u32, error: E },
    /// Every attempt failed with a retryable error.
    Exhausted { attempts: u32, error: E },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Permanent { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            Self::Permanent { error, .. } | Self::Exhausted { error, .. } => error,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Backoff before attempt `n + 1`, given `n >= 1` completed attempts:
    /// `base * 2^(n-1)`, capped at `max_delay`.
    pub fn delay_after(&self, completed_attempts: u32) -> Duration {
        let shift = completed_attempts.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << shift);
        delay.min(self.max_delay)
    }

    /// Run `op` until it succeeds, the predicate rejects the error, or
    /// attempts are exhausted. The predicate decides retryability;
    /// validation failures must return `false` so they are never retried.
    pub async fn run<T, E, Fut, Op, Pred>(
        &self,
        is_retryable: Pred,
        mut op: Op,
    ) -> Result<T, RetryError<E>>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        Pred: Fn(&E) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if !is_retryable(&error) => {
                    return Err(RetryError::Permanent {
                        attempts: attempt,
                        error,
                    });
                }
                Err(error) if attempt >= max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        error,
                    });
                }
                Err(error) => {
                    let delay = self.delay_after(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, %error, "retrying after transient failure");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(1),
            Duration::from_millis(2),
        )
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(4));
        assert_eq!(policy.delay_after(2), Duration::from_secs(8));
        assert_eq!(policy.delay_after(3), Duration::from_secs(10));
        assert_eq!(policy.delay_after(10), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_succeeds_without_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, RetryError<String>> = fast_policy(3)
            .run(
                |_| true,
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(42) }
                },
            )
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_until_exhausted() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, RetryError<String>> = fast_policy(3)
            .run(
                |_| true,
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("rate limited".to_string()) }
                },
            )
            .await;
        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Exhausted { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, RetryError<String>> = fast_policy(3)
            .run(
                |_| false,
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("empty input".to_string()) }
                },
            )
            .await;
        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Permanent { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, RetryError<String>> = fast_policy(3)
            .run(
                |_| true,
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err("timeout".to_string())
                        } else {
                            Ok(7)
                        }
                    }
                },
            )
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
