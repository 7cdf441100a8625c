//! Bounded retry with exponential backoff.
//!
//! The policy is independent of what is being retried: [`retry`] takes the
//! operation, a predicate deciding which errors are worth another attempt,
//! and a deadline no backoff sleep may cross.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// How many times to try, and how long to wait in between.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `failed + 1`, after `failed` failures (1-based).
    ///
    /// `base * 2^(failed - 1)`, capped at `max_delay`.
    pub fn delay_after(&self, failed: u32) -> Duration {
        let exp = failed.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, runs out of
/// attempts, or the next backoff would end past `deadline`.
///
/// Returns the last error on failure.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    deadline: Option<Instant>,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= attempts || !is_retryable(&err) {
                    return Err(err);
                }
                let delay = policy.delay_after(attempt);
                if let Some(deadline) = deadline {
                    if Instant::now() + delay >= deadline {
                        debug!(attempt, "retry would cross the session deadline, giving up");
                        return Err(err);
                    }
                }
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after backoff");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
