//! The card payment manager.
//!
//! Card payments never touch the chain: the backend creates a hosted
//! checkout session and the caller redirects the buyer to its URL. The
//! manager has its own limiter and breaker, so an outage of the card rail
//! does not shut off crypto payments and vice versa.

use std::fmt;

use cedros_pay::proto::{StripeSession, StripeSessionRequest};
use cedros_pay::resilience::{ResilienceConfig, ResilientInvoker};
use cedros_pay::PaymentError;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::constants::{IDEMPOTENCY_KEY_HEADER, STRIPE_SESSION_PATH};
use crate::discovery::RouteDiscovery;
use crate::transport::{CancelSignal, HttpTransport, new_idempotency_key};

/// Client side of hosted card checkout.
pub struct StripeManager {
    transport: HttpTransport,
    routes: RouteDiscovery,
    invoker: ResilientInvoker,
    public_key: String,
}

impl fmt::Debug for StripeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeManager")
            .field("server_url", &self.routes.server_url())
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl StripeManager {
    /// Creates a manager with its own limiter and breaker.
    #[must_use]
    pub fn new(
        transport: HttpTransport,
        routes: RouteDiscovery,
        resilience: &ResilienceConfig,
        public_key: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            routes,
            invoker: ResilientInvoker::from_config("stripe", resilience),
            public_key: public_key.into(),
        }
    }

    /// The Stripe publishable key the checkout page is opened with.
    #[must_use]
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// The resilience stack guarding this manager's calls.
    #[must_use]
    pub const fn invoker(&self) -> &ResilientInvoker {
        &self.invoker
    }

    /// Creates a checkout session and returns its redirect URL.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::InvalidRequirement`](cedros_pay::ErrorCode::InvalidRequirement)
    /// for an empty resource, admission and transport errors, a domain error
    /// from a 4xx body, or
    /// [`ErrorCode::InvalidResponse`](cedros_pay::ErrorCode::InvalidResponse)
    /// for an unrecognised body.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "cedros.stripe.create_session", skip_all, fields(resource = %request.resource), err)
    )]
    pub async fn create_session(
        &self,
        request: &StripeSessionRequest,
        cancel: Option<&CancelSignal>,
    ) -> Result<StripeSession, PaymentError> {
        if request.resource.trim().is_empty() {
            return Err(PaymentError::invalid_requirement(
                "A checkout session needs a resource",
            ));
        }
        let key = new_idempotency_key();
        let (this, key) = (self, key.as_str());
        let response = self
            .transport
            .invoke(
                &self.invoker,
                "POST /paywall/v1/stripe-session",
                cancel,
                move || async move {
                    let url = this.routes.build_url(STRIPE_SESSION_PATH).await;
                    this.transport
                        .client()
                        .post(url)
                        .header(IDEMPOTENCY_KEY_HEADER, key)
                        .json(request)
                },
            )
            .await?;
        if !response.status.is_success() {
            return Err(response.rejection());
        }
        let session: StripeSession = serde_json::from_slice(&response.body).map_err(|e| {
            PaymentError::invalid_response(format!("Malformed checkout session: {e}"))
        })?;

        #[cfg(feature = "telemetry")]
        tracing::info!(session_id = %session.session_id, "checkout session created");

        Ok(session)
    }
}
