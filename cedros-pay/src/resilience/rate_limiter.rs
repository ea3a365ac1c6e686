//! Token-bucket admission control.
//!
//! Each payment manager holds one [`RateLimiter`]. A call is admitted only if
//! a whole token is available; denied calls leave the bucket untouched and
//! never reach the network. Tokens refill continuously at
//! `max_requests / window`.

use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use tokio::time::Instant;

/// Token-bucket parameters.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitConfig {
    /// Bucket capacity, and the number of tokens refilled per window.
    pub max_requests: u32,
    /// Length of the refill window.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "windowMs")]
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// A non-blocking token bucket.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    /// Tokens per second.
    refill_rate: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Creates a full bucket.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        let capacity = f64::from(config.max_requests);
        let refill_rate = if config.window.is_zero() {
            f64::INFINITY
        } else {
            capacity / config.window.as_secs_f64()
        };
        Self {
            capacity,
            refill_rate,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        if elapsed.is_zero() {
            return;
        }
        let added = elapsed.as_secs_f64() * self.refill_rate;
        bucket.tokens = (bucket.tokens + added).min(self.capacity);
        bucket.last_refill = now;
    }

    /// Takes one token if available.
    ///
    /// Returns `false` without side effects when the bucket holds less than
    /// one token.
    pub fn try_consume(&self) -> bool {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, Instant::now());
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            #[cfg(feature = "telemetry")]
            tracing::debug!(tokens = bucket.tokens, "rate limit exceeded");
            false
        }
    }

    /// Whole tokens currently available.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn available_tokens(&self) -> u32 {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, Instant::now());
        bucket.tokens.floor() as u32
    }

    /// How long until the next token is available; zero if one is available now.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn time_until_refill(&self) -> Duration {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, Instant::now());
        if bucket.tokens >= 1.0 {
            return Duration::ZERO;
        }
        if self.refill_rate <= 0.0 {
            return Duration::MAX;
        }
        let millis = ((1.0 - bucket.tokens) / self.refill_rate * 1000.0).ceil();
        Duration::from_millis(millis as u64)
    }

    /// Refills the bucket completely.
    pub fn reset(&self) {
        let mut bucket = self.bucket.lock();
        bucket.tokens = self.capacity;
        bucket.last_refill = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_ms: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_requests,
            window: Duration::from_millis(window_ms),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_admits_exactly_capacity() {
        let limiter = limiter(5, 60_000);
        let admitted = (0..6).filter(|_| limiter.try_consume()).count();
        assert_eq!(admitted, 5);
        assert_eq!(limiter.available_tokens(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_call_has_no_side_effect() {
        let limiter = limiter(1, 1_000);
        assert!(limiter.try_consume());
        let before = limiter.time_until_refill();
        assert!(!limiter.try_consume());
        assert!(!limiter.try_consume());
        assert_eq!(limiter.time_until_refill(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_rate_is_sustained() {
        // 5 per second refills one token every 200ms.
        let limiter = limiter(5, 1_000);
        for _ in 0..5 {
            assert!(limiter.try_consume());
        }
        for _ in 0..20 {
            assert!(!limiter.try_consume());
            tokio::time::advance(Duration::from_millis(200)).await;
            assert!(limiter.try_consume());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_is_capped() {
        let limiter = limiter(3, 1_000);
        assert!(limiter.try_consume());
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(limiter.available_tokens(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_until_refill() {
        let limiter = limiter(2, 1_000);
        assert_eq!(limiter.time_until_refill(), Duration::ZERO);
        assert!(limiter.try_consume());
        assert!(limiter.try_consume());
        assert_eq!(limiter.time_until_refill(), Duration::from_millis(500));
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(limiter.time_until_refill(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_restores_full_bucket() {
        let limiter = limiter(4, 60_000);
        while limiter.try_consume() {}
        limiter.reset();
        assert_eq!(limiter.available_tokens(), 4);
    }

    #[test]
    fn test_config_wire_format() {
        let config: RateLimitConfig =
            serde_json::from_str(r#"{"maxRequests": 3, "windowMs": 1500}"#).unwrap();
        assert_eq!(config.max_requests, 3);
        assert_eq!(config.window, Duration::from_millis(1500));
    }
}
