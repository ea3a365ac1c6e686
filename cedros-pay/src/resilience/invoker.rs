//! The fixed resilience pipeline shared by every payment manager.
//!
//! A call passes, in order: the rate limiter (deny → [`InvokeError::RateLimited`],
//! nothing sent), the circuit breaker (open → [`InvokeError::CircuitOpen`],
//! nothing sent), then the retry policy, which performs the actual call one
//! or more times. Only the error that survives the retry loop is seen by the
//! breaker, so a burst of transient failures that eventually succeeds does
//! not count against the circuit.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
use super::rate_limiter::{RateLimitConfig, RateLimiter};
use super::retry::{RetryConfig, RetryPolicy, Retryable};
use crate::error::PaymentError;

/// Combined configuration for a [`ResilientInvoker`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResilienceConfig {
    /// Token bucket parameters.
    pub rate_limit: RateLimitConfig,
    /// Breaker parameters.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Backoff parameters.
    pub retry: RetryConfig,
}

/// Failure of a call made through a [`ResilientInvoker`].
#[derive(Debug, thiserror::Error)]
pub enum InvokeError<E> {
    /// The local rate limit refused the call.
    #[error("rate limit exceeded, retry in {retry_after:?}")]
    RateLimited {
        /// Time until a token is available.
        retry_after: Duration,
    },
    /// The circuit is open.
    #[error("circuit '{name}' is open, retry in {retry_after:?}")]
    CircuitOpen {
        /// Breaker name.
        name: String,
        /// Time until a probe is admitted.
        retry_after: Duration,
    },
    /// The call ran and failed.
    #[error("{0}")]
    Failed(E),
}

impl<E> From<CircuitBreakerError<E>> for InvokeError<E> {
    fn from(err: CircuitBreakerError<E>) -> Self {
        match err {
            CircuitBreakerError::Open { name, retry_after } => {
                Self::CircuitOpen { name, retry_after }
            }
            CircuitBreakerError::Inner(inner) => Self::Failed(inner),
        }
    }
}

impl<E: Into<PaymentError>> From<InvokeError<E>> for PaymentError {
    fn from(err: InvokeError<E>) -> Self {
        match err {
            InvokeError::RateLimited { retry_after } => Self::rate_limited(retry_after),
            InvokeError::CircuitOpen { name, retry_after } => {
                Self::circuit_open(&name, retry_after)
            }
            InvokeError::Failed(inner) => inner.into(),
        }
    }
}

/// Rate limiter, circuit breaker and retry policy applied as one unit.
#[derive(Debug)]
pub struct ResilientInvoker {
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
}

impl ResilientInvoker {
    /// Assembles an invoker from its parts.
    #[must_use]
    pub const fn new(limiter: RateLimiter, breaker: CircuitBreaker, retry: RetryPolicy) -> Self {
        Self {
            limiter,
            breaker,
            retry,
        }
    }

    /// Builds an invoker whose breaker is called `name`.
    #[must_use]
    pub fn from_config(name: impl Into<String>, config: &ResilienceConfig) -> Self {
        Self::new(
            RateLimiter::new(config.rate_limit),
            CircuitBreaker::new(name, config.circuit_breaker),
            RetryPolicy::new(config.retry),
        )
    }

    /// The rate limiter.
    #[must_use]
    pub const fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// The circuit breaker.
    #[must_use]
    pub const fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// The retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Runs `operation` through limiter, breaker and retry.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::RateLimited`] or [`InvokeError::CircuitOpen`]
    /// without calling `operation`, or [`InvokeError::Failed`] with the error
    /// left after retries.
    pub async fn invoke<T, E, F, Fut>(&self, operation: F) -> Result<T, InvokeError<E>>
    where
        E: Retryable,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.limiter.try_consume() {
            return Err(InvokeError::RateLimited {
                retry_after: self.limiter.time_until_refill(),
            });
        }
        let retry = &self.retry;
        self.breaker
            .execute(|| retry.retry(operation))
            .await
            .map_err(InvokeError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::error::ErrorCode;
    use crate::resilience::CircuitState;

    #[derive(Debug)]
    struct Flaky(bool);

    impl Retryable for Flaky {
        fn is_retryable(&self) -> bool {
            self.0
        }
    }

    impl From<Flaky> for PaymentError {
        fn from(_: Flaky) -> Self {
            Self::new(ErrorCode::NetworkError, "flaky")
        }
    }

    fn invoker(max_requests: u32, threshold: u32, max_retries: u32) -> ResilientInvoker {
        ResilientInvoker::from_config(
            "payment",
            &ResilienceConfig {
                rate_limit: RateLimitConfig {
                    max_requests,
                    window: Duration::from_secs(60),
                },
                circuit_breaker: CircuitBreakerConfig {
                    failure_threshold: threshold,
                    timeout: Duration::from_secs(30),
                },
                retry: RetryConfig {
                    max_retries,
                    initial_delay: Duration::from_millis(5),
                    backoff_factor: 2.0,
                    max_delay: Duration::from_millis(50),
                    jitter: false,
                },
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_checked_first() {
        let invoker = invoker(1, 5, 0);
        let calls = AtomicU32::new(0);
        let op = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Flaky>(())
        };
        assert!(invoker.invoke(op).await.is_ok());
        let err = invoker.invoke(op).await.unwrap_err();
        assert!(matches!(err, InvokeError::RateLimited { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let payment: PaymentError = err.into();
        assert_eq!(payment.code, ErrorCode::RateLimited);
        assert!(payment.retry_after.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_count_once_against_breaker() {
        let invoker = invoker(10, 2, 2);
        let calls = AtomicU32::new(0);
        let op = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(Flaky(true))
        };

        assert!(matches!(invoker.invoke(op).await, Err(InvokeError::Failed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(invoker.breaker().stats().failure_count, 1);

        let _ = invoker.invoke(op).await;
        assert_eq!(invoker.breaker().state(), CircuitState::Open);

        let err = invoker.invoke(op).await.unwrap_err();
        assert!(matches!(err, InvokeError::CircuitOpen { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 6);

        let payment: PaymentError = err.into();
        assert_eq!(payment.code, ErrorCode::CircuitOpen);
        assert!(payment.message.contains("30 seconds"), "{}", payment.message);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_not_retried() {
        let invoker = invoker(10, 5, 3);
        let calls = AtomicU32::new(0);
        let result = invoker
            .invoke(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Flaky(false))
            })
            .await;
        assert!(matches!(result, Err(InvokeError::Failed(Flaky(false)))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
