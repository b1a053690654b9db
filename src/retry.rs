//! Bounded retry with exponential backoff
//!
//! Wraps any fallible async operation. Errors the classifier marks as
//! transient are retried up to `max_retries` times; anything else is
//! returned immediately.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Maximum number of retry attempts
pub const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (in milliseconds)
pub const BASE_DELAY_MS: u64 = 100;

/// Upper bound for a single backoff sleep
const MAX_DELAY: Duration = Duration::from_secs(10);

/// Retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before retry number `retry` (zero-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(MAX_DELAY)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(MAX_RETRIES, Duration::from_millis(BASE_DELAY_MS))
    }
}

/// Failure returned by [`retry`]
#[derive(Debug)]
pub struct RetryError<E> {
    /// The last error observed
    pub error: E,
    /// Attempts made, including the first
    pub attempts: u32,
    /// True when the error was transient and the budget ran out
    pub exhausted: bool,
}

/// Run `op` until it succeeds, fails permanently, or the policy is exhausted
pub async fn retry<T, E, F, Fut, P>(
    policy: RetryPolicy,
    is_transient: P,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !is_transient(&error) {
                    return Err(RetryError {
                        error,
                        attempts: attempt,
                        exhausted: false,
                    });
                }
                if attempt > policy.max_retries {
                    return Err(RetryError {
                        error,
                        attempts: attempt,
                        exhausted: true,
                    });
                }
                let delay = policy.delay_for(attempt - 1);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
