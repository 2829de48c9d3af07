//! Retry with linear backoff and per-call timeouts.
//!
//! Every external call in a run goes through [`retry_with_backoff`]. Attempt
//! `k` failing with a retryable error waits `base_delay * k` before attempt
//! `k + 1`. Non-retryable errors are returned immediately; a retryable error
//! on the last attempt becomes [`AppError::RetryExhausted`].

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::error::AppError;

/// Retry policy for external calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay multiplied by the attempt number before the next attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay applied after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` is reached.
///
/// When a retryable error persists through the last attempt, returns
/// [`AppError::RetryExhausted`] wrapping it.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retryable failure, backing off"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(
                    operation = operation_name,
                    attempts = attempt,
                    error = %e,
                    "Giving up after exhausting retries"
                );
                return Err(AppError::RetryExhausted {
                    attempts: attempt,
                    source: Box::new(e),
                });
            }
            Err(e) => return Err(e),
        }
    }
}

/// Bounds `future` by `timeout`, mapping expiry to [`AppError::Timeout`].
pub async fn with_timeout<T, Fut>(timeout: Duration, future: Fut) -> Result<T, AppError>
where
    Fut: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(timeout.as_secs())),
    }
}
