//! Header names and endpoint paths of the Cedros Pay backend.

/// Payment payload header (client → server), `base64(JSON)`.
pub const X_PAYMENT_HEADER: &str = "X-PAYMENT";

/// Settlement header (server → client), `base64(JSON)`.
pub const X_PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

/// Idempotency header carried by every request.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// HTTP 402 Payment Required status code.
pub const HTTP_STATUS_PAYMENT_REQUIRED: u16 = 402;

/// Health endpoint used for route discovery. Never prefixed.
pub const HEALTH_PATH: &str = "/cedros-health";

/// Quote endpoint.
pub const QUOTE_PATH: &str = "/paywall/v1/quote";

/// Payment verification endpoint.
pub const VERIFY_PATH: &str = "/paywall/v1/verify";

/// Server-built gasless transaction endpoint.
pub const GASLESS_TRANSACTION_PATH: &str = "/paywall/v1/gasless-transaction";

/// Stripe checkout session endpoint.
pub const STRIPE_SESSION_PATH: &str = "/paywall/v1/stripe-session";
