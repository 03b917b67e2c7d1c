use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Bounded retry policy with capped exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one (at least 1)
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(attempt as i32);
        let delay_ms = (self.initial_backoff.as_millis() as f64 * factor) as u64;
        Duration::from_millis(delay_ms).min(self.max_backoff)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget is spent. The last error is returned when exhausted.
    ///
    /// - `operation(attempt)`: performs one attempt (0-based)
    /// - `should_retry(&err)`: whether this error is worth another attempt
    pub async fn execute<Op, Fut, T, E, ShouldRetry>(
        &self,
        label: &str,
        mut operation: Op,
        should_retry: ShouldRetry,
    ) -> Result<T, E>
    where
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        ShouldRetry: Fn(&E) -> bool,
        E: Display,
    {
        let max = self.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            let error = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !should_retry(&error) {
                return Err(error);
            }

            let next_attempt = attempt + 1;
            if next_attempt >= max {
                warn!(
                    operation = label,
                    attempts = next_attempt,
                    "Retries exhausted: {}",
                    error
                );
                return Err(error);
            }

            let delay = self.delay_for(attempt);
            debug!(
                operation = label,
                attempt = attempt,
                next_attempt = next_attempt,
                delay_ms = delay.as_millis() as u64,
                "Retry backoff after error: {}",
                error
            );
            tokio::time::sleep(delay).await;

            attempt = next_attempt;
        }
    }
}
