//! Failure-aware call gate.
//!
//! A [`CircuitBreaker`] counts failed operations. Once `failure_threshold`
//! failures accumulate it opens and rejects calls without invoking them
//! until `timeout` has elapsed. The next call after that is a probe
//! (half-open): success closes the circuit, failure reopens it.
//!
//! State transitions are evaluated lazily whenever the breaker is consulted;
//! there is no background timer.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use tokio::time::Instant;

/// Breaker parameters.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CircuitBreakerConfig {
    /// Failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before allowing a probe.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "timeoutMs")]
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Circuit breaker state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Calls flow through.
    Closed,
    /// Calls are rejected without being invoked.
    Open,
    /// The next call is a probe.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        })
    }
}

/// Snapshot of a breaker's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitStats {
    /// Current state.
    pub state: CircuitState,
    /// Failures since the circuit last closed.
    pub failure_count: u32,
    /// Successful calls, lifetime.
    pub success_count: u64,
    /// Calls rejected while open, lifetime.
    pub rejection_count: u64,
    /// When the last failure was recorded.
    pub last_failure_time: Option<Instant>,
    /// When the last success was recorded.
    pub last_success_time: Option<Instant>,
    /// When an open circuit will admit a probe. Set only while open.
    pub next_attempt_time: Option<Instant>,
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// The circuit is open; the operation was not invoked.
    #[error("circuit '{name}' is open, retry in {retry_after:?}")]
    Open {
        /// Breaker name.
        name: String,
        /// Time until a probe will be admitted.
        retry_after: Duration,
    },
    /// The operation ran and failed.
    #[error("{0}")]
    Inner(E),
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    success_count: u64,
    rejection_count: u64,
    last_failure_time: Option<Instant>,
    last_success_time: Option<Instant>,
    next_attempt_time: Option<Instant>,
}

impl Inner {
    const fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            rejection_count: 0,
            last_failure_time: None,
            last_success_time: None,
            next_attempt_time: None,
        }
    }

    fn refresh(&mut self, now: Instant) {
        if self.state == CircuitState::Open
            && self.next_attempt_time.is_some_and(|next| now >= next)
        {
            self.state = CircuitState::HalfOpen;
            self.next_attempt_time = None;
        }
    }
}

/// A named circuit breaker.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner::new()),
        }
    }

    /// The breaker's name, used in logs and error messages.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, after applying any due open → half-open transition.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        inner.refresh(Instant::now());
        inner.state
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> CircuitStats {
        let mut inner = self.inner.lock();
        inner.refresh(Instant::now());
        CircuitStats {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            rejection_count: inner.rejection_count,
            last_failure_time: inner.last_failure_time,
            last_success_time: inner.last_success_time,
            next_attempt_time: inner.next_attempt_time,
        }
    }

    /// Forces the breaker closed and clears the failure count.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.next_attempt_time = None;
    }

    /// Runs `operation` through the breaker.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitBreakerError::Open`] without invoking `operation` if
    /// the circuit is open, or [`CircuitBreakerError::Inner`] with the
    /// operation's own error. Every `Inner` error counts as a failure; callers
    /// that need to exempt some errors should return them inside `Ok`.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.admit()?;
        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(CircuitBreakerError::Inner(err))
            }
        }
    }

    fn admit<E>(&self) -> Result<(), CircuitBreakerError<E>> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.refresh(now);
        if inner.state != CircuitState::Open {
            return Ok(());
        }
        inner.rejection_count += 1;
        let retry_after = inner
            .next_attempt_time
            .map_or(self.config.timeout, |next| next.saturating_duration_since(now));
        Err(CircuitBreakerError::Open {
            name: self.name.clone(),
            retry_after,
        })
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        inner.success_count += 1;
        inner.last_success_time = Some(Instant::now());
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                #[cfg(feature = "telemetry")]
                tracing::info!(breaker = %self.name, "circuit closed, dependency recovered");
            }
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure_time = Some(now);
        let trip = match inner.state {
            CircuitState::Closed => inner.failure_count >= self.config.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };
        if trip {
            inner.state = CircuitState::Open;
            inner.next_attempt_time = Some(now + self.config.timeout);
            #[cfg(feature = "telemetry")]
            tracing::warn!(
                breaker = %self.name,
                failures = inner.failure_count,
                "circuit opened"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker(threshold: u32, timeout_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                timeout: Duration::from_millis(timeout_ms),
            },
        )
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), CircuitBreakerError<String>> {
        breaker.execute(|| async { Err("boom".to_owned()) }).await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<(), CircuitBreakerError<String>> {
        breaker.execute(|| async { Ok(()) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_threshold() {
        let breaker = breaker(3, 1_000);
        for _ in 0..2 {
            assert!(matches!(fail(&breaker).await, Err(CircuitBreakerError::Inner(_))));
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
        assert!(fail(&breaker).await.is_err());
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.stats().next_attempt_time.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_rejects_without_invoking() {
        let breaker = breaker(1, 1_000);
        let _ = fail(&breaker).await;

        let calls = AtomicU32::new(0);
        let result: Result<(), CircuitBreakerError<String>> = breaker
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        match result {
            Err(CircuitBreakerError::Open { retry_after, name }) => {
                assert_eq!(retry_after, Duration::from_millis(1_000));
                assert_eq!(name, "test");
            }
            other => panic!("expected open circuit, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(breaker.stats().rejection_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_timeout() {
        let breaker = breaker(1, 1_000);
        let _ = fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(999)).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.stats().next_attempt_time.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes() {
        let breaker = breaker(2, 500);
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(500)).await;

        assert!(succeed(&breaker).await.is_ok());
        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let breaker = breaker(2, 500);
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(500)).await;

        assert!(matches!(fail(&breaker).await, Err(CircuitBreakerError::Inner(_))));
        assert_eq!(breaker.state(), CircuitState::Open);
        match succeed(&breaker).await {
            Err(CircuitBreakerError::Open { retry_after, .. }) => {
                assert_eq!(retry_after, Duration::from_millis(500));
            }
            other => panic!("expected open circuit, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count_when_closed() {
        let breaker = breaker(3, 1_000);
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        assert!(succeed(&breaker).await.is_ok());
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().success_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset() {
        let breaker = breaker(1, 60_000);
        let _ = fail(&breaker).await;
        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(succeed(&breaker).await.is_ok());
    }
}
