//! Resilience primitives: rate limiting, circuit breaking and retry.

mod circuit_breaker;
mod invoker;
mod rate_limiter;
mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState, CircuitStats,
};
pub use invoker::{InvokeError, ResilienceConfig, ResilientInvoker};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use retry::{RetryConfig, RetryPolicy, Retryable, is_retryable_status};
