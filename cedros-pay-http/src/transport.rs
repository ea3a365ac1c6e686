//! Timeout-bounded, cancellable HTTP exchanges.
//!
//! [`HttpTransport::send`] performs one request and reads the whole body,
//! racing both against the configured timeout and an optional
//! [`CancelSignal`]. [`HttpTransport::invoke`] runs such exchanges through a
//! [`ResilientInvoker`] with the classification every manager shares:
//!
//! - 5xx and 429 are transient: retried, and counted by the breaker once
//!   retries are exhausted
//! - any other status is returned as a response, so domain rejections are
//!   never retried and never trip the breaker
//! - cancellation ends the call immediately and is not a breaker failure

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cedros_pay::proto::ServerError;
use cedros_pay::resilience::{ResilientInvoker, is_retryable_status};
use cedros_pay::{ErrorCode, PaymentError};
use parking_lot::Mutex;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::{Client, RequestBuilder, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

const DEFAULT_CANCEL_REASON: &str = "cancelled by caller";

/// A cancellation handle that remembers why it was triggered.
///
/// Clones share state: cancelling any clone cancels all of them. The first
/// reason given wins.
#[derive(Clone, Default)]
pub struct CancelSignal {
    token: CancellationToken,
    reason: Arc<Mutex<Option<String>>>,
}

impl fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelSignal")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl CancelSignal {
    /// Creates an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Triggers the signal.
    pub fn cancel(&self, reason: impl Into<String>) {
        {
            let mut slot = self.reason.lock();
            if slot.is_none() {
                *slot = Some(reason.into());
            }
        }
        self.token.cancel();
    }

    /// Whether the signal has been triggered.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The reason given to [`cancel`](Self::cancel).
    #[must_use]
    pub fn reason(&self) -> String {
        self.reason
            .lock()
            .clone()
            .unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_owned())
    }

    /// Completes once the signal is triggered.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

/// A fully read HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Returns `true` if the response declares a JSON body.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("json"))
    }

    /// Returns a header value as a string, if present and valid.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The body as text, replacing invalid UTF-8.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Interprets a non-success response as a structured domain error.
    #[must_use]
    pub fn rejection(&self) -> PaymentError {
        ServerError::parse(&self.body).map_or_else(
            || {
                PaymentError::new(
                    ErrorCode::PaymentRejected,
                    format!("The payment server rejected the request (HTTP {}).", self.status),
                )
            },
            |err| err.into_payment_error(ErrorCode::PaymentRejected),
        )
    }
}

/// Shared HTTP client with a per-request deadline.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Creates a transport with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Build`] if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(concat!("cedros-pay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(TransportError::Build)?;
        Ok(Self::with_client(client, timeout))
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// The underlying client, for building requests.
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }

    /// The per-request deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends one request and reads the full body.
    ///
    /// Any status is returned as a response; only transport-level problems
    /// are errors.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Timeout`] when the deadline elapses,
    /// [`TransportError::Cancelled`] with the signal's reason when `cancel`
    /// fires first, or a connection/body error.
    pub async fn send(
        &self,
        request: RequestBuilder,
        context: &'static str,
        cancel: Option<&CancelSignal>,
    ) -> Result<HttpResponse, TransportError> {
        let exchange = async {
            let response = request.send().await.map_err(|source| {
                if source.is_timeout() {
                    TransportError::Timeout {
                        context,
                        timeout: self.timeout,
                    }
                } else {
                    TransportError::Connect { context, source }
                }
            })?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|source| TransportError::Body { context, source })?;
            Ok::<_, TransportError>(HttpResponse {
                status,
                headers,
                body: body.to_vec(),
            })
        };
        let bounded = tokio::time::timeout(self.timeout, exchange);
        let outcome = match cancel {
            Some(signal) => tokio::select! {
                biased;
                () = signal.cancelled() => {
                    return Err(TransportError::Cancelled { context, reason: signal.reason() });
                }
                outcome = bounded => outcome,
            },
            None => bounded.await,
        };
        outcome.map_err(|_| TransportError::Timeout {
            context,
            timeout: self.timeout,
        })?
    }

    /// Runs a request through `invoker` with shared status classification.
    ///
    /// `build` is called once per attempt, so route resolution and request
    /// construction happen inside the retry loop.
    ///
    /// # Errors
    ///
    /// Returns admission errors from the invoker, the surviving transport
    /// error mapped to a [`PaymentError`], or [`ErrorCode::Cancelled`].
    /// Non-transient error statuses are *not* errors here; callers turn them
    /// into domain errors with [`HttpResponse::rejection`].
    pub async fn invoke<B, BFut>(
        &self,
        invoker: &ResilientInvoker,
        context: &'static str,
        cancel: Option<&CancelSignal>,
        build: B,
    ) -> Result<HttpResponse, PaymentError>
    where
        B: Fn() -> BFut,
        BFut: Future<Output = RequestBuilder>,
    {
        if let Some(signal) = cancel.filter(|s| s.is_cancelled()) {
            return Err(PaymentError::cancelled(&signal.reason()));
        }
        let build = &build;
        let attempt = move || async move {
            match self.send(build().await, context, cancel).await {
                Ok(response) if is_retryable_status(response.status.as_u16()) => {
                    Err(TransportError::Status {
                        context,
                        status: response.status,
                        body: response.text(),
                    })
                }
                Ok(response) => Ok(Ok(response)),
                Err(TransportError::Cancelled { reason, .. }) => Ok(Err(reason)),
                Err(err) => Err(err),
            }
        };
        let invoked = invoker.invoke(attempt);
        let outcome = match cancel {
            Some(signal) => tokio::select! {
                biased;
                () = signal.cancelled() => {
                    return Err(PaymentError::cancelled(&signal.reason()));
                }
                outcome = invoked => outcome,
            },
            None => invoked.await,
        };
        match outcome.map_err(PaymentError::from)? {
            Ok(response) => Ok(response),
            Err(reason) => Err(PaymentError::cancelled(&reason)),
        }
    }
}

/// Generates a fresh idempotency key.
#[must_use]
pub fn new_idempotency_key() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cedros_pay::resilience::{
        CircuitBreakerConfig, CircuitState, RateLimitConfig, ResilienceConfig, RetryConfig,
    };
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn invoker(max_retries: u32, threshold: u32) -> ResilientInvoker {
        ResilientInvoker::from_config(
            "test",
            &ResilienceConfig {
                rate_limit: RateLimitConfig {
                    max_requests: 100,
                    window: Duration::from_secs(1),
                },
                circuit_breaker: CircuitBreakerConfig {
                    failure_threshold: threshold,
                    timeout: Duration::from_secs(30),
                },
                retry: RetryConfig {
                    max_retries,
                    initial_delay: Duration::from_millis(5),
                    backoff_factor: 2.0,
                    max_delay: Duration::from_millis(20),
                    jitter: false,
                },
            },
        )
    }

    #[tokio::test]
    async fn test_send_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Duration::from_millis(50)).unwrap();
        let request = transport.client().get(format!("{}/slow", server.uri()));
        let err = transport.send(request, "GET /slow", None).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_send_honours_cancel_reason() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let signal = CancelSignal::new();
        let canceller = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel("user closed dialog");
        });

        let request = transport.client().get(format!("{}/slow", server.uri()));
        let err = transport
            .send(request, "GET /slow", Some(&signal))
            .await
            .unwrap_err();
        match err {
            TransportError::Cancelled { reason, .. } => assert_eq!(reason, "user closed dialog"),
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[test]
    fn test_first_cancel_reason_wins() {
        let signal = CancelSignal::new();
        assert_eq!(signal.reason(), DEFAULT_CANCEL_REASON);
        signal.cancel("first");
        signal.cancel("second");
        assert!(signal.is_cancelled());
        assert_eq!(signal.reason(), "first");
    }

    #[tokio::test]
    async fn test_invoke_retries_5xx_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let invoker = invoker(3, 5);
        let url = format!("{}/flaky", server.uri());
        let response = transport
            .invoke(&invoker, "GET /flaky", None, || {
                std::future::ready(transport.client().get(&url))
            })
            .await
            .unwrap();
        assert_eq!(response.text(), "ok");
        assert_eq!(invoker.breaker().stats().failure_count, 0);
    }

    #[tokio::test]
    async fn test_invoke_does_not_retry_or_trip_on_4xx() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"code": "invalid_signature", "message": "Signature does not verify"}
            })))
            .expect(3)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let invoker = invoker(3, 1);
        let url = format!("{}/verify", server.uri());
        for _ in 0..3 {
            let response = transport
                .invoke(&invoker, "POST /verify", None, || {
                    std::future::ready(transport.client().post(&url))
                })
                .await
                .unwrap();
            let err = response.rejection();
            assert_eq!(err.code, ErrorCode::InvalidSignature);
            assert_eq!(err.message, "Signature does not verify");
        }
        assert_eq!(invoker.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_invoke_exhausted_5xx_opens_breaker() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let invoker = invoker(1, 1);
        let url = format!("{}/down", server.uri());
        let build = || std::future::ready(transport.client().get(&url));

        let err = transport.invoke(&invoker, "GET /down", None, build).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ServiceUnavailable);

        let err = transport.invoke(&invoker, "GET /down", None, build).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::CircuitOpen);
        assert!(err.retry_after.is_some());
    }

    #[tokio::test]
    async fn test_invoke_cancelled_is_not_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let invoker = invoker(3, 1);
        let signal = CancelSignal::new();
        let canceller = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel("navigated away");
        });

        let url = format!("{}/slow", server.uri());
        let err = transport
            .invoke(&invoker, "GET /slow", Some(&signal), || {
                std::future::ready(transport.client().get(&url))
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Cancelled);
        assert!(err.message.contains("navigated away"));
        assert_eq!(invoker.breaker().state(), CircuitState::Closed);
    }
}
