//! Retry with exponential backoff
//!
//! Generic over the unit of work's success type, so JSON-payload calls and
//! plain-text calls share one backoff implementation.

use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};

/// Error classification used by [`retry_with_backoff`]
pub trait Retryable: Sized {
    /// Transient failures worth another attempt
    fn is_retryable(&self) -> bool;

    /// Terminal error wrapping the last failure once attempts run out
    fn exhausted(attempts: u32, last: Self) -> Self;
}

/// Backoff parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first attempt included
    pub max_attempts: u32,
    /// Time unit multiplied by `factor^attempt`
    pub base_delay: Duration,
    pub factor: u32,
    /// Upper bound of the uniform random jitter added to each wait
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            factor: 2,
            max_jitter: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Deterministic part of the wait after the failed attempt `attempt` (0-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let multiplier = self.factor.saturating_pow(attempt);
        self.base_delay.saturating_mul(multiplier)
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Run `operation` until it succeeds, fails permanently, or attempts run out.
///
/// **Algorithm:**
/// 1. Attempt operation
/// 2. If successful, return result
/// 3. If the error is not retryable, return it immediately (no backoff)
/// 4. If attempts remain: log WARN, sleep `base * factor^attempt + jitter`, retry
/// 5. Otherwise return `E::exhausted(attempts, last_error)`
///
/// No sleep follows the final attempt.
pub async fn retry_with_backoff<F, Fut, T, E>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let start_time = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(operation = operation_name, attempt, "Retrying operation");
        }

        let err = match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            tracing::debug!(
                operation = operation_name,
                attempt,
                error = %err,
                "Non-retryable failure"
            );
            return Err(err);
        }

        if attempt >= max_attempts {
            tracing::error!(
                operation = operation_name,
                attempt,
                elapsed_ms = start_time.elapsed().as_millis() as u64,
                error = %err,
                "Operation failed: retries exhausted"
            );
            return Err(E::exhausted(attempt, err));
        }

        let wait = policy.backoff_for(attempt - 1).saturating_add(policy.jitter());

        tracing::warn!(
            operation = operation_name,
            attempt,
            backoff_ms = wait.as_millis() as u64,
            error = %err,
            "Retryable failure, will retry after backoff"
        );

        tokio::time::sleep(wait).await;
    }
}
