//! Error types for the HTTP transport layer.

use std::time::Duration;

use cedros_pay::encoding::DecodeError;
use cedros_pay::proto::ServerError;
use cedros_pay::resilience::{Retryable, is_retryable_status};
use cedros_pay::{ErrorCode, PaymentError};
use reqwest::StatusCode;

/// Errors that can occur during header encoding and decoding.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The header value was not `base64(JSON)` of the expected type.
    #[error("header decode error: {0}")]
    Decode(#[from] DecodeError),
}

impl From<HttpError> for PaymentError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Serialize(e) => {
                Self::new(ErrorCode::InvalidRequirement, format!("Cannot encode payment: {e}"))
            }
            HttpError::Decode(e) => {
                Self::invalid_response(format!("Malformed settlement header: {e}"))
            }
        }
    }
}

/// A request that did not produce a usable response.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    /// A URL could not be parsed.
    #[error("invalid URL: {context}: {source}")]
    Url {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },

    /// The request did not complete within its deadline.
    #[error("request timed out after {timeout:?}: {context}")]
    Timeout {
        /// Human-readable context.
        context: &'static str,
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// Connection, DNS or protocol failure.
    #[error("HTTP error: {context}: {source}")]
    Connect {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The response body could not be read.
    #[error("failed to read response body: {context}: {source}")]
    Body {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a transient failure status (5xx or 429).
    #[error("unexpected HTTP status {status}: {context}: {body}")]
    Status {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },

    /// The caller cancelled the request.
    #[error("cancelled: {context}: {reason}")]
    Cancelled {
        /// Human-readable context.
        context: &'static str,
        /// The reason given by the canceller.
        reason: String,
    },
}

impl Retryable for TransportError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connect { .. } | Self::Body { .. } => true,
            Self::Status { status, .. } => is_retryable_status(status.as_u16()),
            Self::Build(_) | Self::Url { .. } | Self::Cancelled { .. } => false,
        }
    }
}

impl From<TransportError> for PaymentError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Build(e) => {
                Self::new(ErrorCode::InvalidConfig, format!("HTTP client unavailable: {e}"))
            }
            TransportError::Url { context, source } => {
                Self::new(ErrorCode::InvalidConfig, format!("{context}: {source}"))
            }
            TransportError::Timeout { timeout, .. } => Self::new(
                ErrorCode::Timeout,
                format!(
                    "The payment server did not respond within {} ms.",
                    timeout.as_millis()
                ),
            ),
            TransportError::Connect { source, .. } | TransportError::Body { source, .. } => {
                Self::new(
                    ErrorCode::NetworkError,
                    format!("Could not reach the payment server: {source}"),
                )
            }
            TransportError::Status { status, body, .. } => {
                let fallback = Self::new(
                    ErrorCode::ServiceUnavailable,
                    format!("The payment server is unavailable (HTTP {status})."),
                );
                match ServerError::parse(body.as_bytes()) {
                    Some(ServerError {
                        message: Some(message),
                        ..
                    }) => Self::new(ErrorCode::ServiceUnavailable, message),
                    _ => fallback,
                }
            }
            TransportError::Cancelled { reason, .. } => Self::cancelled(&reason),
        }
    }
}
