//! Error taxonomy for Cedros Pay payment attempts.
//!
//! Every terminal failure of a payment operation resolves into a
//! [`PaymentError`]: a machine-readable [`ErrorCode`], a human-readable
//! message, and, for admission failures, a retry-after hint.
//!
//! Codes fall into four classes (see [`ErrorClass`]):
//!
//! - **admission**: rate limit exceeded, circuit open; never reach the network
//! - **transport**: timeout, connection failure, cancellation
//! - **domain**: malformed requirement, insufficient funds, expired quote, ...
//! - **server**: 5xx responses and explicit "service unavailable"

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde_with::{DeserializeFromStr, SerializeDisplay};

/// Broad class of an [`ErrorCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Local admission control refused the call.
    Admission,
    /// The request did not complete at the transport level.
    Transport,
    /// The server (or a local check) rejected the payment itself.
    Domain,
    /// The server failed to process the request.
    Server,
}

/// Machine-readable failure code.
///
/// Serializes as a `snake_case` string. Codes sent by the server that are not
/// known to this client are preserved in [`ErrorCode::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub enum ErrorCode {
    /// Local token bucket is empty.
    RateLimited,
    /// The circuit breaker for the dependency is open.
    CircuitOpen,
    /// Connection, DNS or other transport failure.
    NetworkError,
    /// The request exceeded its deadline.
    Timeout,
    /// The caller cancelled the operation.
    Cancelled,
    /// The server returned 5xx (or 429) until retries were exhausted.
    ServiceUnavailable,
    /// The server-issued payment requirement is malformed.
    InvalidRequirement,
    /// The server response could not be understood.
    InvalidResponse,
    /// The payer does not hold enough of the asset.
    InsufficientFunds,
    /// The transaction signature was rejected.
    InvalidSignature,
    /// The quote outlived its `maxTimeoutSeconds`.
    QuoteExpired,
    /// The signature was already used for a previous payment.
    ReplayedSignature,
    /// The transferred amount does not match the quote.
    AmountMismatch,
    /// The server rejected the payment without a more specific code.
    PaymentRejected,
    /// The requirement names an asset this client is not allowed to pay with.
    UnknownAsset,
    /// The wallet could not build or sign the transaction.
    WalletError,
    /// The client configuration is invalid.
    InvalidConfig,
    /// Any other server-provided code.
    Other(String),
}

impl ErrorCode {
    /// Returns the wire representation of the code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::CircuitOpen => "circuit_open",
            Self::NetworkError => "network_error",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::ServiceUnavailable => "service_unavailable",
            Self::InvalidRequirement => "invalid_requirement",
            Self::InvalidResponse => "invalid_response",
            Self::InsufficientFunds => "insufficient_funds",
            Self::InvalidSignature => "invalid_signature",
            Self::QuoteExpired => "quote_expired",
            Self::ReplayedSignature => "replayed_signature",
            Self::AmountMismatch => "amount_mismatch",
            Self::PaymentRejected => "payment_rejected",
            Self::UnknownAsset => "unknown_asset",
            Self::WalletError => "wallet_error",
            Self::InvalidConfig => "invalid_config",
            Self::Other(code) => code,
        }
    }

    /// Returns the class this code belongs to.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::RateLimited | Self::CircuitOpen => ErrorClass::Admission,
            Self::NetworkError | Self::Timeout | Self::Cancelled => ErrorClass::Transport,
            Self::ServiceUnavailable => ErrorClass::Server,
            _ => ErrorClass::Domain,
        }
    }

    /// Returns `true` for domain failures, which retrying cannot change.
    #[must_use]
    pub const fn is_domain(&self) -> bool {
        matches!(self.class(), ErrorClass::Domain)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = match s.trim().to_ascii_lowercase().as_str() {
            "rate_limited" | "rate_limit_exceeded" => Self::RateLimited,
            "circuit_open" => Self::CircuitOpen,
            "network_error" => Self::NetworkError,
            "timeout" => Self::Timeout,
            "cancelled" | "canceled" => Self::Cancelled,
            "service_unavailable" | "internal_error" => Self::ServiceUnavailable,
            "invalid_requirement" | "invalid_payment_requirement" => Self::InvalidRequirement,
            "invalid_response" => Self::InvalidResponse,
            "insufficient_funds" | "insufficient_balance" => Self::InsufficientFunds,
            "invalid_signature" => Self::InvalidSignature,
            "quote_expired" | "payment_expired" => Self::QuoteExpired,
            "replayed_signature" | "signature_replayed" | "duplicate_signature" => {
                Self::ReplayedSignature
            }
            "amount_mismatch" | "invalid_amount" => Self::AmountMismatch,
            "payment_rejected" => Self::PaymentRejected,
            "unknown_asset" | "unsupported_asset" => Self::UnknownAsset,
            "wallet_error" => Self::WalletError,
            "invalid_config" => Self::InvalidConfig,
            _ => Self::Other(s.to_owned()),
        };
        Ok(code)
    }
}

/// A terminal failure of a payment operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct PaymentError {
    /// Machine-readable reason.
    pub code: ErrorCode,
    /// Human-readable description suitable for display.
    pub message: String,
    /// How long the caller should wait before trying again, if known.
    pub retry_after: Option<Duration>,
}

impl PaymentError {
    /// Creates a new error with the given code and message.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Local rate limit exceeded.
    #[must_use]
    pub fn rate_limited(retry_after: Duration) -> Self {
        Self::new(
            ErrorCode::RateLimited,
            format!(
                "Too many payment attempts. Please wait {} before trying again.",
                approximate_wait(retry_after)
            ),
        )
        .with_retry_after(retry_after)
    }

    /// The circuit breaker guarding `service` is open.
    #[must_use]
    pub fn circuit_open(service: &str, retry_after: Duration) -> Self {
        Self::new(
            ErrorCode::CircuitOpen,
            format!(
                "The {service} service is temporarily unavailable. Please try again in about {}.",
                approximate_wait(retry_after)
            ),
        )
        .with_retry_after(retry_after)
    }

    /// The caller cancelled the operation.
    #[must_use]
    pub fn cancelled(reason: &str) -> Self {
        Self::new(ErrorCode::Cancelled, format!("Payment cancelled: {reason}"))
    }

    /// The requirement failed validation.
    #[must_use]
    pub fn invalid_requirement(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequirement, message)
    }

    /// The server response could not be understood.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidResponse, message)
    }

    /// Sets the retry-after hint.
    #[must_use]
    pub const fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Returns `true` if this is a domain failure.
    #[must_use]
    pub const fn is_domain(&self) -> bool {
        self.code.is_domain()
    }
}

/// Renders a wait as whole seconds, rounding up, never below one second.
fn approximate_wait(wait: Duration) -> String {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    match secs.max(1) {
        1 => "1 second".to_owned(),
        n => format!("{n} seconds"),
    }
}
