//! The x402 crypto payment manager.
//!
//! One payment attempt runs strictly in order:
//!
//! 1. **Quote**: ask the server for the [`PaymentRequirement`] of a resource
//! 2. **Build & sign**: hand it to a [`PaymentWallet`]
//! 3. **Submit**: send the signed payload in `X-PAYMENT`, with one
//!    idempotency key for the whole attempt
//! 4. **Settle**: read the verdict from `X-PAYMENT-RESPONSE`
//!
//! The gasless variant replaces step 2 with a server-built transaction that
//! the wallet only partially signs.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use cedros_pay::networks::{SolanaCluster, check_asset};
use cedros_pay::proto::{
    GaslessTransaction, GaslessTransactionRequest, PaymentPayload, PaymentRequirement,
    QuoteRequest, QuoteResponse, SettlementResponse,
};
use cedros_pay::resilience::{ResilienceConfig, ResilientInvoker};
use cedros_pay::wallet::{PaymentWallet, SignedTransaction};
use cedros_pay::{ErrorCode, PaymentError};
use tokio::time::Instant;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::constants::{
    GASLESS_TRANSACTION_PATH, HTTP_STATUS_PAYMENT_REQUIRED, IDEMPOTENCY_KEY_HEADER, QUOTE_PATH,
    VERIFY_PATH, X_PAYMENT_HEADER, X_PAYMENT_RESPONSE_HEADER,
};
use crate::discovery::RouteDiscovery;
use crate::headers::{decode_settlement_header, encode_payment_header};
use crate::transport::{CancelSignal, HttpResponse, HttpTransport, new_idempotency_key};

/// A validated requirement and the instant it stops being payable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    /// What the server asked for.
    pub requirement: PaymentRequirement,
    /// When the quote was received.
    pub received_at: Instant,
}

impl Quote {
    /// Wraps a requirement received now.
    #[must_use]
    pub fn new(requirement: PaymentRequirement) -> Self {
        Self {
            requirement,
            received_at: Instant::now(),
        }
    }

    /// `received_at + maxTimeoutSeconds`.
    #[must_use]
    pub fn expires_at(&self) -> Instant {
        self.received_at + Duration::from_secs(self.requirement.max_timeout_seconds)
    }

    /// Whether the quote can no longer be paid.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at()
    }
}

/// Proof of a settled payment.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentReceipt {
    /// Settlement transaction hash, or the payer's signature when the server
    /// sent no settlement header.
    pub transaction_id: String,
    /// The decoded `X-PAYMENT-RESPONSE`, if present.
    pub settlement: Option<SettlementResponse>,
    /// The idempotency key the payment was submitted with.
    pub idempotency_key: String,
    /// The JSON response body, if the server sent one.
    pub body: Option<serde_json::Value>,
}

/// Client side of the x402 payment protocol.
pub struct X402Manager {
    transport: HttpTransport,
    routes: RouteDiscovery,
    invoker: ResilientInvoker,
    cluster: SolanaCluster,
    allow_unknown_mint: bool,
}

impl fmt::Debug for X402Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("X402Manager")
            .field("server_url", &self.routes.server_url())
            .field("cluster", &self.cluster)
            .field("allow_unknown_mint", &self.allow_unknown_mint)
            .finish_non_exhaustive()
    }
}

impl X402Manager {
    /// Creates a manager with its own limiter and breaker.
    #[must_use]
    pub fn new(
        transport: HttpTransport,
        routes: RouteDiscovery,
        resilience: &ResilienceConfig,
        cluster: SolanaCluster,
    ) -> Self {
        Self {
            transport,
            routes,
            invoker: ResilientInvoker::from_config("x402", resilience),
            cluster,
            allow_unknown_mint: false,
        }
    }

    /// Accepts quotes for mints outside the known stablecoin list.
    #[must_use]
    pub const fn with_allow_unknown_mint(mut self, allow: bool) -> Self {
        self.allow_unknown_mint = allow;
        self
    }

    /// The resilience stack guarding this manager's calls.
    #[must_use]
    pub const fn invoker(&self) -> &ResilientInvoker {
        &self.invoker
    }

    /// The route discovery used to build URLs.
    #[must_use]
    pub const fn routes(&self) -> &RouteDiscovery {
        &self.routes
    }

    /// Requests a quote for `resource`.
    ///
    /// HTTP 402 is the expected answer and counts as success.
    ///
    /// # Errors
    ///
    /// Returns admission and transport errors, a domain error parsed from a
    /// 4xx body, [`ErrorCode::InvalidResponse`] for an unrecognised body, or
    /// a validation error for a malformed requirement.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "cedros.x402.request_quote", skip_all, fields(resource = %resource), err)
    )]
    pub async fn request_quote(
        &self,
        resource: &str,
        coupon_code: Option<&str>,
        cancel: Option<&CancelSignal>,
    ) -> Result<Quote, PaymentError> {
        let body = QuoteRequest {
            resource: resource.to_owned(),
            coupon_code: coupon_code.map(str::to_owned),
        };
        let key = new_idempotency_key();
        let (this, body, key) = (self, &body, key.as_str());
        let response = self
            .transport
            .invoke(&self.invoker, "POST /paywall/v1/quote", cancel, move || async move {
                let url = this.routes.build_url(QUOTE_PATH).await;
                this.transport
                    .client()
                    .post(url)
                    .header(IDEMPOTENCY_KEY_HEADER, key)
                    .json(body)
            })
            .await?;

        if response.status.as_u16() != HTTP_STATUS_PAYMENT_REQUIRED && !response.status.is_success() {
            return Err(response.rejection());
        }
        let requirement = QuoteResponse::parse(&response.body)?.into_requirement()?;
        self.validate_requirement(&requirement)?;
        Ok(Quote::new(requirement))
    }

    /// Rejects malformed requirements and unaccepted assets.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::InvalidRequirement`] or [`ErrorCode::UnknownAsset`].
    pub fn validate_requirement(&self, requirement: &PaymentRequirement) -> Result<(), PaymentError> {
        requirement.validate()?;
        check_asset(self.cluster, &requirement.asset, self.allow_unknown_mint)
    }

    /// Builds the payload for a signed transfer.
    #[must_use]
    pub fn build_payment_payload(
        &self,
        requirement: &PaymentRequirement,
        signed: SignedTransaction,
        payer: &str,
        metadata: Option<BTreeMap<String, String>>,
    ) -> PaymentPayload {
        let payload = PaymentPayload::new(requirement, signed, payer);
        match metadata {
            Some(metadata) => payload.with_metadata(metadata),
            None => payload,
        }
    }

    /// Submits a signed payment for `quote`.
    ///
    /// `idempotency_key` identifies the logical attempt; retries inside this
    /// call reuse it.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::QuoteExpired`] without any network call for an
    /// expired quote, admission and transport errors, a domain error from a
    /// failed settlement or a 4xx body, or [`ErrorCode::InvalidResponse`] for
    /// an undecodable settlement header.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "cedros.x402.submit_payment", skip_all, fields(resource = %quote.requirement.resource), err)
    )]
    pub async fn submit_payment(
        &self,
        quote: &Quote,
        payload: &PaymentPayload,
        idempotency_key: &str,
        cancel: Option<&CancelSignal>,
    ) -> Result<PaymentReceipt, PaymentError> {
        if quote.is_expired() {
            return Err(PaymentError::new(
                ErrorCode::QuoteExpired,
                "The quote has expired. Please request a new quote and try again.",
            ));
        }
        let header = encode_payment_header(payload)?;
        let (this, header) = (self, header.as_str());
        let response = self
            .transport
            .invoke(&self.invoker, "POST /paywall/v1/verify", cancel, move || async move {
                let url = this.routes.build_url(VERIFY_PATH).await;
                this.transport
                    .client()
                    .post(url)
                    .header(X_PAYMENT_HEADER, header)
                    .header(IDEMPOTENCY_KEY_HEADER, idempotency_key)
            })
            .await?;
        settle(response, &payload.payload.signature, idempotency_key)
    }

    /// Quotes, signs and submits a payment for `resource` in one attempt.
    ///
    /// # Errors
    ///
    /// Returns the first error of any step.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "cedros.x402.process_payment", skip_all, fields(resource = %resource), err)
    )]
    pub async fn process_payment(
        &self,
        resource: &str,
        coupon_code: Option<&str>,
        wallet: &dyn PaymentWallet,
        cancel: Option<&CancelSignal>,
    ) -> Result<PaymentReceipt, PaymentError> {
        let quote = self.request_quote(resource, coupon_code, cancel).await?;
        let signed = wallet.build_and_sign(&quote.requirement).await?;
        let payload = self.build_payment_payload(&quote.requirement, signed, &wallet.address(), None);
        let key = new_idempotency_key();
        self.submit_payment(&quote, &payload, &key, cancel).await
    }

    /// Asks the server to build a fee-sponsored transaction.
    ///
    /// # Errors
    ///
    /// Returns admission and transport errors, a domain error from a 4xx
    /// body, or [`ErrorCode::InvalidResponse`] for an unrecognised body.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "cedros.x402.build_gasless_transaction", skip_all, fields(resource = %request.resource_id), err)
    )]
    pub async fn build_gasless_transaction(
        &self,
        request: &GaslessTransactionRequest,
        cancel: Option<&CancelSignal>,
    ) -> Result<GaslessTransaction, PaymentError> {
        let key = new_idempotency_key();
        let (this, key) = (self, key.as_str());
        let response = self
            .transport
            .invoke(
                &self.invoker,
                "POST /paywall/v1/gasless-transaction",
                cancel,
                move || async move {
                    let url = this.routes.build_url(GASLESS_TRANSACTION_PATH).await;
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
        serde_json::from_slice(&response.body).map_err(|e| {
            PaymentError::invalid_response(format!("Malformed gasless transaction: {e}"))
        })
    }

    /// Quotes, obtains a server-built transaction, co-signs and submits it.
    ///
    /// # Errors
    ///
    /// Returns the first error of any step.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "cedros.x402.process_gasless_payment", skip_all, fields(resource = %resource), err)
    )]
    pub async fn process_gasless_payment(
        &self,
        resource: &str,
        coupon_code: Option<&str>,
        wallet: &dyn PaymentWallet,
        cancel: Option<&CancelSignal>,
    ) -> Result<PaymentReceipt, PaymentError> {
        let quote = self.request_quote(resource, coupon_code, cancel).await?;
        let payer = wallet.address();
        let request = GaslessTransactionRequest {
            resource_id: resource.to_owned(),
            user_wallet: payer.clone(),
            fee_payer: quote.requirement.fee_payer().map(str::to_owned),
            coupon_code: coupon_code.map(str::to_owned),
        };
        let gasless = self.build_gasless_transaction(&request, cancel).await?;
        let signed = wallet.partially_sign(&gasless.transaction).await?;
        let payload = self.build_payment_payload(&quote.requirement, signed, &payer, None);
        let key = new_idempotency_key();
        self.submit_payment(&quote, &payload, &key, cancel).await
    }
}

/// Interprets a verify response. The settlement header is read first; the
/// body is read only when declared JSON and never invalidates a settlement.
/// An undecodable header is ignored: the status then decides the outcome.
fn settle(
    response: HttpResponse,
    signature: &str,
    idempotency_key: &str,
) -> Result<PaymentReceipt, PaymentError> {
    let settlement = response
        .header(X_PAYMENT_RESPONSE_HEADER)
        .and_then(|header| match decode_settlement_header(header) {
            Ok(settlement) => Some(settlement),
            Err(_err) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(error = %_err, "ignoring undecodable settlement header");
                None
            }
        });
    if let Some(err) = settlement.as_ref().and_then(SettlementResponse::failure) {
        return Err(err);
    }
    if !response.status.is_success() {
        return Err(response.rejection());
    }
    let body = if response.is_json() {
        serde_json::from_slice::<serde_json::Value>(&response.body).ok()
    } else {
        None
    };
    let transaction_id = settlement
        .as_ref()
        .and_then(|s| s.tx_hash.clone())
        .unwrap_or_else(|| signature.to_owned());

    #[cfg(feature = "telemetry")]
    tracing::info!(transaction_id = %transaction_id, "payment settled");

    Ok(PaymentReceipt {
        transaction_id,
        settlement,
        idempotency_key: idempotency_key.to_owned(),
        body,
    })
}
