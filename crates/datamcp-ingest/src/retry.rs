//! Exponential backoff around fallible async operations
//!
//! Every error is retried the same way; there is no jitter and no error
//! classification. Callers that have non-retryable failures must detect them
//! before handing the operation to [`RetryPolicy::run`].

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_BACKOFF: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,

    /// Sleep before the first retry
    pub delay: Duration,

    /// Factor applied to the sleep for each further retry
    pub backoff: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: DEFAULT_DELAY,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration, backoff: f64) -> Self {
        Self {
            max_retries,
            delay,
            backoff,
        }
    }

    /// Policy that never retries
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, 1.0)
    }

    /// Sleep taken after the `attempt`-th failure (1-based):
    /// `delay * backoff^(attempt - 1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.delay.as_secs_f64() * self.backoff.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Every sleep a fully exhausted run takes, in order
    pub fn schedule(&self) -> Vec<Duration> {
        (1..=self.max_retries).map(|attempt| self.delay_for(attempt)).collect()
    }

    /// Longest time a caller can block in backoff sleeps
    pub fn max_total_delay(&self) -> Duration {
        self.schedule()
            .into_iter()
            .fold(Duration::ZERO, Duration::saturating_add)
    }

    /// Run `op` until it succeeds or `max_retries` retries have failed, in
    /// which case the last error is returned.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        error!(
                            operation,
                            attempts = attempt,
                            error = %err,
                            "Exceeded retries"
                        );
                        return Err(err);
                    }
                    let sleep = self.delay_for(attempt);
                    warn!(
                        operation,
                        "Retry {}/{} after error: {} (sleep {:.1}s)",
                        attempt,
                        self.max_retries,
                        err,
                        sleep.as_secs_f64()
                    );
                    tokio::time::sleep(sleep).await;
                },
            }
        }
    }
}
