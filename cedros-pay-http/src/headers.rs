//! Encoding and decoding of the `X-PAYMENT` and `X-PAYMENT-RESPONSE` headers.
//!
//! Both headers carry `base64(JSON)`.

use cedros_pay::encoding::{decode_json, encode_json};
use cedros_pay::proto::{PaymentPayload, SettlementResponse};

use crate::error::HttpError;

/// Encodes a [`PaymentPayload`] for the `X-PAYMENT` header.
///
/// # Errors
///
/// Returns [`HttpError::Serialize`] if JSON serialization fails.
pub fn encode_payment_header(payload: &PaymentPayload) -> Result<String, HttpError> {
    Ok(encode_json(payload)?)
}

/// Decodes an `X-PAYMENT` header value.
///
/// # Errors
///
/// Returns [`HttpError`] on Base64 or JSON decode failure.
pub fn decode_payment_header(header_value: &str) -> Result<PaymentPayload, HttpError> {
    Ok(decode_json(header_value)?)
}

/// Encodes a [`SettlementResponse`] for the `X-PAYMENT-RESPONSE` header.
///
/// # Errors
///
/// Returns [`HttpError::Serialize`] if JSON serialization fails.
pub fn encode_settlement_header(response: &SettlementResponse) -> Result<String, HttpError> {
    Ok(encode_json(response)?)
}

/// Decodes an `X-PAYMENT-RESPONSE` header value.
///
/// # Errors
///
/// Returns [`HttpError`] on Base64 or JSON decode failure.
pub fn decode_settlement_header(header_value: &str) -> Result<SettlementResponse, HttpError> {
    Ok(decode_json(header_value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cedros_pay::proto::{ExactPayload, V1};

    #[test]
    fn test_payment_header_is_base64_json() {
        let payload = PaymentPayload {
            x402_version: V1,
            scheme: "exact".into(),
            network: "solana-devnet".into(),
            payload: ExactPayload {
                signature: "sig".into(),
                transaction: "AQ==".into(),
                payer: "Payer".into(),
                memo: None,
                metadata: None,
            },
        };
        let header = encode_payment_header(&payload).unwrap();
        assert!(!header.contains('{'));
        assert_eq!(decode_payment_header(&header).unwrap(), payload);
    }

    #[test]
    fn test_settlement_header_decodes_server_value() {
        // {"success":true,"txHash":"5abc","networkId":"solana"}
        let header = "eyJzdWNjZXNzIjp0cnVlLCJ0eEhhc2giOiI1YWJjIiwibmV0d29ya0lkIjoic29sYW5hIn0=";
        let settlement = decode_settlement_header(header).unwrap();
        assert!(settlement.success);
        assert_eq!(settlement.tx_hash.as_deref(), Some("5abc"));
        assert_eq!(settlement.network_id.as_deref(), Some("solana"));
    }

    #[test]
    fn test_settlement_header_rejects_garbage() {
        assert!(matches!(
            decode_settlement_header("%%%"),
            Err(HttpError::Decode(_))
        ));
    }
}
