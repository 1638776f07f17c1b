//! Retry policy and executor

use log::{debug, info, warn};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// A bounded number of attempts separated by a constant tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Pause between two attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` attempts separated by a constant tick.
    ///
    /// This is the shape of every supervisor wait: the budget is counted in
    /// attempts and the tick is the configured poll interval.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

/// Trait for errors that can be retried
pub trait Retryable {
    /// Whether this error is retryable
    fn is_retryable(&self) -> bool;
}

/// Retry executor
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute a function with retry logic
    pub async fn execute<F, Fut, T, E>(&self, mut f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let mut attempt = 1;

        loop {
            debug!(
                "Executing attempt {} of {}",
                attempt, self.policy.max_attempts
            );

            match f().await {
                Ok(result) => {
                    if attempt > 1 {
                        info!("Operation succeeded after {} attempts", attempt);
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !error.is_retryable() {
                        warn!("Operation failed with non-retryable error: {}", error);
                        return Err(RetryError::NonRetryableError(error));
                    }

                    if attempt >= self.policy.max_attempts {
                        debug!("Operation failed after {} attempts: {}", attempt, error);
                        return Err(RetryError::MaxAttemptsExceeded {
                            attempts: attempt,
                            last_error: error,
                        });
                    }

                    debug!(
                        "Attempt {} failed: {}. Retrying in {:?}",
                        attempt, error, self.policy.delay
                    );
                    sleep(self.policy.delay).await;

                    attempt += 1;
                }
            }
        }
    }
}

/// Retry error types
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every attempt failed
    #[error("Maximum retry attempts ({attempts}) exceeded. Last error: {last_error}")]
    MaxAttemptsExceeded { attempts: u32, last_error: E },

    /// Non-retryable error encountered
    #[error("Non-retryable error: {0}")]
    NonRetryableError(E),
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::MaxAttemptsExceeded { attempts, .. } => *attempts,
            RetryError::NonRetryableError(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    enum ProbeError {
        Unreachable,
        WrongWorker,
    }

    impl std::fmt::Display for ProbeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                ProbeError::Unreachable => write!(f, "worker unreachable"),
                ProbeError::WrongWorker => write!(f, "worker refused identity"),
            }
        }
    }

    impl Retryable for ProbeError {
        fn is_retryable(&self) -> bool {
            matches!(self, ProbeError::Unreachable)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_after_failures() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let executor = RetryExecutor::new(RetryPolicy::fixed(5, Duration::from_secs(1)));

        let result = executor
            .execute(|| {
                let count = counter_clone.fetch_add(1, Ordering::Relaxed);
                async move {
                    if count < 2 {
                        Err(ProbeError::Unreachable)
                    } else {
                        Ok("healthy")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "healthy");
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_budget_never_sleeps() {
        let executor = RetryExecutor::new(RetryPolicy::fixed(1, Duration::from_secs(3600)));
        let started = tokio::time::Instant::now();

        let result: Result<(), _> = executor
            .execute(|| async { Err(ProbeError::Unreachable) })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts(), 1);
        assert!(matches!(err, RetryError::MaxAttemptsExceeded { .. }));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_max_attempts_exceeded() {
        let executor = RetryExecutor::new(RetryPolicy::fixed(3, Duration::from_millis(10)));

        let result: Result<(), RetryError<ProbeError>> = executor
            .execute(|| async { Err(ProbeError::Unreachable) })
            .await;

        assert_eq!(result.unwrap_err().attempts(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let executor = RetryExecutor::new(RetryPolicy::fixed(10, Duration::from_secs(1)));

        let result: Result<(), RetryError<ProbeError>> = executor
            .execute(|| {
                counter_clone.fetch_add(1, Ordering::Relaxed);
                async { Err(ProbeError::WrongWorker) }
            })
            .await;

        assert!(matches!(
            result.unwrap_err(),
            RetryError::NonRetryableError(ProbeError::WrongWorker)
        ));
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_fixed_policy_never_has_zero_attempts() {
        assert_eq!(RetryPolicy::fixed(0, Duration::ZERO).max_attempts, 1);
    }
}
