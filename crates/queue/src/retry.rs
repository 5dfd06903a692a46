//! Retry with exponential backoff.
//!
//! Only transient errors are retried. Errors classified as permanent by
//! [`AppError::is_retryable`] fail fast so a malformed input never burns
//! retry budget.

use std::time::Duration;

use taleforge_common::{AppError, AppResult};
use tracing::warn;

/// Retry policy with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the initial call.
    pub max_retries: u32,
    /// Delay before the first retry. Doubles on each subsequent attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Create a policy from worker configuration values.
    #[must_use]
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(60),
        }
    }

    /// Delay before retry number `attempt` (0-indexed): `base * 2^attempt`,
    /// capped at `max_delay`.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_secs = self.base_delay.as_secs_f64() * 2f64.powi(attempt as i32);
        let delay = Duration::from_secs_f64(delay_secs);

        if delay > self.max_delay {
            self.max_delay
        } else {
            delay
        }
    }

    /// Whether another attempt is allowed after `attempt` retries.
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Run `operation` until it succeeds, retries are exhausted, or a
    /// non-retryable error is returned.
    ///
    /// # Errors
    ///
    /// Returns the last error once the retry budget is spent, or the first
    /// error that [`AppError::is_retryable`] classifies as permanent.
    pub async fn run<F, Fut, T>(&self, label: &str, operation: F) -> AppResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt: u32 = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => {
                    warn!(label, error = %e, "operation failed with permanent error");
                    return Err(e);
                }
                Err(e) if !self.should_retry(attempt) => {
                    warn!(
                        label,
                        attempts = attempt + 1,
                        error = %e,
                        "operation failed, retries exhausted"
                    );
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        label,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Like [`run`](Self::run), but maps exhausted retries to `fallback`
    /// instead of an error. Used for non-critical pipeline steps.
    pub async fn run_with_fallback<F, Fut, T>(&self, label: &str, operation: F, fallback: T) -> T
    where
        F: Fn() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        match self.run(label, operation).await {
            Ok(value) => value,
            Err(e) => {
                warn!(label, error = %e, "falling back after failure");
                fallback
            }
        }
    }
}

/// Retryability check shared with the worker's ack decision.
#[must_use]
pub fn is_permanent(error: &AppError) -> bool {
    !error.is_retryable()
}
