//! Bounded retry with exponential backoff and full jitter.

use std::future::Future;
use std::time::Duration;

use rand::RngExt;
use rand::rng;
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};

/// Backoff parameters.
///
/// The delay before retry `n` (0-based) is
/// `min(initial_delay * backoff_factor^n, max_delay)`. With `jitter` on, the
/// actual sleep is drawn uniformly from `[0, delay]`.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "initialDelayMs")]
    pub initial_delay: Duration,
    /// Growth factor between consecutive delays.
    pub backoff_factor: f64,
    /// Upper bound on any single delay.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "maxDelayMs")]
    pub max_delay: Duration,
    /// Randomise each delay over `[0, delay]`.
    pub jitter: bool,
}

impl RetryConfig {
    /// Two fast retries, for interactive calls.
    #[must_use]
    pub const fn quick() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(2),
            jitter: true,
        }
    }

    /// The default for payment calls.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }

    /// More retries with a higher ceiling.
    #[must_use]
    pub const fn aggressive() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }

    /// Many slow retries, for background work.
    #[must_use]
    pub const fn patient() -> Self {
        Self {
            max_retries: 10,
            initial_delay: Duration::from_secs(2),
            backoff_factor: 1.5,
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }

    /// Disables jitter.
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Deterministic delay before retry `attempt` (0-based), before jitter.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let max = self.max_delay.as_secs_f64();
        if !secs.is_finite() || secs >= max {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Delay to actually sleep before retry `attempt`, with jitter applied.
    #[must_use]
    pub fn sample_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        Duration::from_secs_f64(rng().random_range(0.0..=delay.as_secs_f64()))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::standard()
    }
}

/// Errors that know whether retrying them can help.
pub trait Retryable {
    /// Returns `true` for transient failures.
    fn is_retryable(&self) -> bool;
}

/// Default classification of HTTP statuses: 5xx and 429 are transient,
/// everything else is final.
#[must_use]
pub const fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500..=599)
}

/// Re-invokes a fallible operation according to a [`RetryConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Creates a policy from a config.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// The policy's config.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Default retry decision: the error is retryable and retries remain.
    pub fn should_retry<E: Retryable>(&self, error: &E, attempt: u32) -> bool {
        attempt < self.config.max_retries && error.is_retryable()
    }

    /// Runs `operation`, retrying errors that report themselves retryable.
    ///
    /// # Errors
    ///
    /// Returns the last error once it is not retryable or retries run out.
    pub async fn retry<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        E: Retryable,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.retry_if(operation, |err: &E, _| err.is_retryable()).await
    }

    /// Runs `operation`, retrying while `should_retry(error, attempt)` holds
    /// and retries remain.
    ///
    /// # Errors
    ///
    /// Returns the last error once the predicate refuses or retries run out.
    pub async fn retry_if<T, E, F, Fut, P>(&self, mut operation: F, mut should_retry: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnMut(&E, u32) -> bool,
    {
        let mut attempt: u32 = 0;
        let mut total_delay = Duration::ZERO;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if attempt >= self.config.max_retries || !should_retry(&err, attempt) {
                trace_give_up(attempt + 1, total_delay);
                return Err(err);
            }
            let delay = self.config.sample_delay(attempt);
            #[cfg(feature = "telemetry")]
            tracing::debug!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "retrying after transient failure"
            );
            total_delay += delay;
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn trace_give_up(attempts: u32, total_delay: Duration) {
    #[cfg(feature = "telemetry")]
    tracing::debug!(
        attempts,
        total_delay_ms = u64::try_from(total_delay.as_millis()).unwrap_or(u64::MAX),
        "giving up"
    );
    #[cfg(not(feature = "telemetry"))]
    let _ = (attempts, total_delay);
}
