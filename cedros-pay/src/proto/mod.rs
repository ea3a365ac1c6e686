//! Wire format types for the Cedros Pay x402 protocol.
//!
//! All JSON field names are `camelCase`. Types here describe what travels
//! between the client and the paywall backend:
//!
//! - [`PaymentRequirement`]: what the server wants to be paid, issued in a quote
//! - [`QuoteResponse`]: the two shapes a quote body can take
//! - [`PaymentPayload`]: the signed transfer, sent base64-encoded in `X-PAYMENT`
//! - [`SettlementResponse`]: the server's verdict, from `X-PAYMENT-RESPONSE`
//! - [`GaslessTransactionRequest`] / [`GaslessTransaction`]: server-built transfers
//! - [`StripeSessionRequest`] / [`StripeSession`]: hosted card checkout
//! - [`ServerError`]: the error body returned alongside 4xx responses

mod version;

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use version::X402Version;

use crate::error::{ErrorCode, PaymentError};
use crate::wallet::SignedTransaction;

/// Convenience constant for constructing protocol messages.
pub const V1: X402Version = X402Version;

/// The only payment scheme Cedros Pay servers issue.
pub const EXACT_SCHEME: &str = "exact";

/// Payment terms issued by the server for one resource.
///
/// Every field defaults when absent so that a structurally incomplete
/// requirement still parses and can be rejected by [`validate`](Self::validate)
/// with a precise message instead of a serde error.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentRequirement {
    /// The payment scheme, `"exact"` in practice.
    pub scheme: String,
    /// The network name, e.g. `"solana"` or `"solana-devnet"`.
    pub network: String,
    /// Amount in the asset's atomic units, as a decimal string.
    pub max_amount_required: String,
    /// Identifier of the resource being paid for.
    pub resource: String,
    /// Human-readable description of the resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Recipient of the payment.
    pub pay_to: String,
    /// Token mint address.
    pub asset: String,
    /// How long, in seconds, the quote stays valid.
    pub max_timeout_seconds: u64,
    /// Scheme-specific extra data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<RequirementExtra>,
}

/// Solana-specific requirement details.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequirementExtra {
    /// Token account that receives the transfer, if it differs from `payTo`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_token_account: Option<String>,
    /// Memo to attach to the transfer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    /// Account that pays the network fee, when not the payer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_payer: Option<String>,
    /// Decimals of the asset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
}

impl PaymentRequirement {
    /// Checks that the requirement is structurally complete.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::InvalidRequirement`] naming the first missing or
    /// malformed field.
    pub fn validate(&self) -> Result<(), PaymentError> {
        let required = [
            ("scheme", &self.scheme),
            ("network", &self.network),
            ("maxAmountRequired", &self.max_amount_required),
            ("resource", &self.resource),
            ("payTo", &self.pay_to),
            ("asset", &self.asset),
        ];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(PaymentError::invalid_requirement(format!(
                "Payment requirement is missing `{field}`"
            )));
        }
        if self.max_timeout_seconds == 0 {
            return Err(PaymentError::invalid_requirement(
                "Payment requirement has a zero `maxTimeoutSeconds`",
            ));
        }
        self.amount().map(|_| ())
    }

    /// Parses `maxAmountRequired` into atomic units.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::InvalidRequirement`] if the amount is not an
    /// unsigned integer.
    pub fn amount(&self) -> Result<u64, PaymentError> {
        self.max_amount_required.trim().parse::<u64>().map_err(|_| {
            PaymentError::invalid_requirement(format!(
                "Payment amount `{}` is not an unsigned integer",
                self.max_amount_required
            ))
        })
    }

    /// Renders the amount in whole-token units, e.g. `1.5` for `1500000` at 6 decimals.
    ///
    /// Returns `None` if the amount does not parse or `decimals` is out of range.
    #[must_use]
    pub fn display_amount(&self, decimals: u32) -> Option<Decimal> {
        let atomic = self.amount().ok()?;
        Decimal::try_from_i128_with_scale(i128::from(atomic), decimals)
            .ok()
            .map(|d| d.normalize())
    }

    /// Account that must receive the transfer.
    #[must_use]
    pub fn recipient(&self) -> &str {
        self.extra
            .as_ref()
            .and_then(|e| e.recipient_token_account.as_deref())
            .unwrap_or(&self.pay_to)
    }

    /// Memo to attach to the transfer, if any.
    #[must_use]
    pub fn memo(&self) -> Option<&str> {
        self.extra.as_ref().and_then(|e| e.memo.as_deref())
    }

    /// Account that pays the network fee, if not the payer.
    #[must_use]
    pub fn fee_payer(&self) -> Option<&str> {
        self.extra.as_ref().and_then(|e| e.fee_payer.as_deref())
    }
}

/// Body of a quote request.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    /// Resource to quote.
    pub resource: String,
    /// Optional coupon to apply to the price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
}

/// Body of a quote response.
///
/// Servers answer in one of two shapes: the current `{"crypto": R}` or the
/// older `{"accepts": [R, ...]}`. Both are recognised explicitly; anything
/// else is an [`ErrorCode::InvalidResponse`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QuoteResponse {
    /// `{"crypto": requirement}`
    Crypto(PaymentRequirement),
    /// `{"accepts": [requirement, ...]}`
    Accepts(Vec<PaymentRequirement>),
}

#[derive(Deserialize)]
struct QuoteWire {
    #[serde(default)]
    crypto: Option<PaymentRequirement>,
    #[serde(default)]
    accepts: Option<Vec<PaymentRequirement>>,
}

impl QuoteResponse {
    /// Parses a quote response body.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::InvalidResponse`] if the body is not JSON or
    /// carries neither `crypto` nor `accepts`.
    pub fn parse(body: &[u8]) -> Result<Self, PaymentError> {
        let wire: QuoteWire = serde_json::from_slice(body)
            .map_err(|e| PaymentError::invalid_response(format!("Malformed quote: {e}")))?;
        match (wire.crypto, wire.accepts) {
            (Some(requirement), _) => Ok(Self::Crypto(requirement)),
            (None, Some(accepts)) => Ok(Self::Accepts(accepts)),
            (None, None) => Err(PaymentError::invalid_response(
                "Quote carries neither `crypto` nor `accepts`",
            )),
        }
    }

    /// Collapses the response into the single requirement to pay.
    ///
    /// For the list shape the first entry using the `exact` scheme wins,
    /// falling back to the first entry.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::InvalidResponse`] for an empty `accepts` list.
    pub fn into_requirement(self) -> Result<PaymentRequirement, PaymentError> {
        match self {
            Self::Crypto(requirement) => Ok(requirement),
            Self::Accepts(mut accepts) => {
                let index = accepts
                    .iter()
                    .position(|r| r.scheme == EXACT_SCHEME)
                    .unwrap_or(0);
                if accepts.is_empty() {
                    return Err(PaymentError::invalid_response(
                        "Quote `accepts` list is empty",
                    ));
                }
                Ok(accepts.swap_remove(index))
            }
        }
    }
}

/// Signed payment sent to the server in the `X-PAYMENT` header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// Always `1`.
    pub x402_version: X402Version,
    /// Copied from the requirement.
    pub scheme: String,
    /// Copied from the requirement.
    pub network: String,
    /// The signed transfer.
    pub payload: ExactPayload,
}

/// Scheme payload of an `exact` payment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactPayload {
    /// Base58 transaction signature.
    pub signature: String,
    /// Base64 serialized transaction.
    pub transaction: String,
    /// Payer wallet address.
    pub payer: String,
    /// Memo attached to the transfer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    /// Caller-supplied metadata forwarded to the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

impl PaymentPayload {
    /// Builds the payload for `requirement` from a signed transaction.
    #[must_use]
    pub fn new(
        requirement: &PaymentRequirement,
        signed: SignedTransaction,
        payer: impl Into<String>,
    ) -> Self {
        Self {
            x402_version: V1,
            scheme: requirement.scheme.clone(),
            network: requirement.network.clone(),
            payload: ExactPayload {
                signature: signed.signature,
                transaction: signed.transaction,
                payer: payer.into(),
                memo: requirement.memo().map(str::to_owned),
                metadata: None,
            },
        }
    }

    /// Attaches caller metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.payload.metadata = (!metadata.is_empty()).then_some(metadata);
        self
    }
}

/// Settlement verdict returned in the `X-PAYMENT-RESPONSE` header.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResponse {
    /// Whether the payment settled.
    pub success: bool,
    /// Failure reason when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// On-chain transaction signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Network the payment settled on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
    /// Server-defined extra data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl SettlementResponse {
    /// The domain error carried by a failed settlement, if it failed.
    ///
    /// The code is parsed from `error` when it names a known code and is
    /// [`ErrorCode::PaymentRejected`] otherwise.
    #[must_use]
    pub fn failure(&self) -> Option<PaymentError> {
        if self.success {
            return None;
        }
        let reason = self.error.as_deref().unwrap_or_default();
        let code = match reason.parse().unwrap_or(ErrorCode::PaymentRejected) {
            ErrorCode::Other(_) => ErrorCode::PaymentRejected,
            code => code,
        };
        let message = if reason.is_empty() {
            "Payment was not settled".to_owned()
        } else {
            format!("Payment was not settled: {reason}")
        };
        Some(PaymentError::new(code, message))
    }
}

/// Request for a server-built, fee-sponsored transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GaslessTransactionRequest {
    /// Resource being paid for.
    pub resource_id: String,
    /// Payer wallet address.
    pub user_wallet: String,
    /// Preferred fee payer, if the caller has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_payer: Option<String>,
    /// Optional coupon.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
}

/// A server-built transaction awaiting the payer's signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GaslessTransaction {
    /// Base64 serialized transaction, fee payer slot already filled or reserved.
    pub transaction: String,
    /// Recent blockhash the transaction was built against.
    pub blockhash: String,
    /// Account paying the network fee.
    pub fee_payer: String,
}

/// Request for a hosted card checkout session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StripeSessionRequest {
    /// Resource being purchased.
    pub resource: String,
    /// Where to send the buyer after payment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_url: Option<String>,
    /// Where to send the buyer on cancel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_url: Option<String>,
    /// Caller metadata stored with the session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
    /// Pre-filled customer email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    /// Optional coupon.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
}

/// A created checkout session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StripeSession {
    /// Stripe session id.
    pub session_id: String,
    /// Hosted checkout URL to redirect the buyer to.
    pub url: String,
}

/// Structured error body sent by the server with a 4xx response.
///
/// Accepts both `{"error": {"code": "...", "message": "..."}}` and
/// `{"error": "...", "code": "..."}`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerError {
    /// Machine-readable code, if present.
    pub code: Option<String>,
    /// Human-readable message, if present.
    pub message: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorField {
    Message(String),
    Detailed {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<ErrorField>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ServerError {
    /// Extracts an error from a response body.
    ///
    /// Returns `None` for bodies that are not JSON or carry no error fields.
    #[must_use]
    pub fn parse(body: &[u8]) -> Option<Self> {
        let envelope: ErrorEnvelope = serde_json::from_slice(body).ok()?;
        let parsed = match envelope.error {
            Some(ErrorField::Detailed { code, message }) => Self {
                code: code.or(envelope.code),
                message: message.or(envelope.message),
            },
            Some(ErrorField::Message(message)) => Self {
                code: envelope.code,
                message: Some(message),
            },
            None => Self {
                code: envelope.code,
                message: envelope.message,
            },
        };
        (parsed.code.is_some() || parsed.message.is_some()).then_some(parsed)
    }

    /// Converts into a [`PaymentError`], falling back to `fallback` for the code.
    #[must_use]
    pub fn into_payment_error(self, fallback: ErrorCode) -> PaymentError {
        let code = self
            .code
            .as_deref()
            .and_then(|c| c.parse::<ErrorCode>().ok())
            .unwrap_or(fallback);
        let message = self
            .message
            .unwrap_or_else(|| format!("Payment failed ({code})"));
        PaymentError::new(code, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn requirement_json() -> serde_json::Value {
        json!({
            "scheme": "exact",
            "network": "solana",
            "maxAmountRequired": "1500000",
            "resource": "article-42",
            "payTo": "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin",
            "asset": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
            "maxTimeoutSeconds": 300,
            "extra": { "memo": "order-7", "decimals": 6 }
        })
    }

    #[test]
    fn test_parse_crypto_shape() {
        let body = json!({ "crypto": requirement_json() }).to_string();
        let quote = QuoteResponse::parse(body.as_bytes()).unwrap();
        let requirement = quote.into_requirement().unwrap();
        assert_eq!(requirement.resource, "article-42");
        assert_eq!(requirement.memo(), Some("order-7"));
        assert!(requirement.validate().is_ok());
    }

    #[test]
    fn test_parse_accepts_shape_prefers_exact() {
        let mut other = requirement_json();
        other["scheme"] = json!("upto");
        let body = json!({ "accepts": [other, requirement_json()] }).to_string();
        let requirement = QuoteResponse::parse(body.as_bytes())
            .unwrap()
            .into_requirement()
            .unwrap();
        assert_eq!(requirement.scheme, "exact");
    }

    #[test]
    fn test_parse_rejects_unknown_shape() {
        let err = QuoteResponse::parse(br#"{"price": 1}"#).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidResponse);

        let err = QuoteResponse::parse(br#"{"accepts": []}"#)
            .unwrap()
            .into_requirement()
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidResponse);
    }

    #[test]
    fn test_validate_missing_field() {
        let mut value = requirement_json();
        value.as_object_mut().unwrap().remove("payTo");
        let requirement: PaymentRequirement = serde_json::from_value(value).unwrap();
        let err = requirement.validate().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequirement);
        assert!(err.message.contains("payTo"));
    }

    #[test]
    fn test_validate_zero_timeout_and_bad_amount() {
        let mut requirement: PaymentRequirement =
            serde_json::from_value(requirement_json()).unwrap();
        requirement.max_timeout_seconds = 0;
        assert!(requirement.validate().is_err());

        requirement.max_timeout_seconds = 60;
        requirement.max_amount_required = "1.5".into();
        let err = requirement.validate().unwrap_err();
        assert!(err.message.contains("unsigned integer"));
    }

    #[test]
    fn test_display_amount() {
        let requirement: PaymentRequirement = serde_json::from_value(requirement_json()).unwrap();
        assert_eq!(requirement.display_amount(6).unwrap().to_string(), "1.5");
    }

    #[test]
    fn test_recipient_prefers_token_account() {
        let mut requirement: PaymentRequirement =
            serde_json::from_value(requirement_json()).unwrap();
        assert_eq!(requirement.recipient(), requirement.pay_to);
        requirement.extra = Some(RequirementExtra {
            recipient_token_account: Some("TokenAcct".into()),
            ..RequirementExtra::default()
        });
        assert_eq!(requirement.recipient(), "TokenAcct");
    }

    #[test]
    fn test_payload_wire_shape() {
        let requirement: PaymentRequirement = serde_json::from_value(requirement_json()).unwrap();
        let signed = SignedTransaction {
            transaction: "AQID".into(),
            signature: "5sig".into(),
        };
        let payload = PaymentPayload::new(&requirement, signed, "Payer111");
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            json!({
                "x402Version": 1,
                "scheme": "exact",
                "network": "solana",
                "payload": {
                    "signature": "5sig",
                    "transaction": "AQID",
                    "payer": "Payer111",
                    "memo": "order-7"
                }
            })
        );
    }

    #[test]
    fn test_settlement_failure_maps_code() {
        let settlement = SettlementResponse {
            success: false,
            error: Some("amount_mismatch".into()),
            ..SettlementResponse::default()
        };
        assert_eq!(settlement.failure().unwrap().code, ErrorCode::AmountMismatch);

        let settlement = SettlementResponse {
            success: false,
            error: Some("blockhash not found".into()),
            ..SettlementResponse::default()
        };
        let err = settlement.failure().unwrap();
        assert_eq!(err.code, ErrorCode::PaymentRejected);
        assert!(err.message.contains("blockhash not found"));

        let settled = SettlementResponse {
            success: true,
            ..SettlementResponse::default()
        };
        assert!(settled.failure().is_none());
    }

    #[test]
    fn test_server_error_shapes() {
        let nested = ServerError::parse(
            br#"{"error":{"code":"insufficient_funds","message":"Balance too low"}}"#,
        )
        .unwrap();
        let err = nested.into_payment_error(ErrorCode::PaymentRejected);
        assert_eq!(err.code, ErrorCode::InsufficientFunds);
        assert_eq!(err.message, "Balance too low");

        let flat = ServerError::parse(br#"{"error":"Quote expired","code":"quote_expired"}"#)
            .unwrap();
        let err = flat.into_payment_error(ErrorCode::PaymentRejected);
        assert_eq!(err.code, ErrorCode::QuoteExpired);
        assert_eq!(err.message, "Quote expired");

        assert!(ServerError::parse(b"<html>").is_none());
        assert!(ServerError::parse(b"{}").is_none());
    }
}
