//! The wallet capability consumed by payment managers.
//!
//! Managers never touch keys or chain RPC directly. They hand a
//! [`PaymentRequirement`] to a [`PaymentWallet`] and get back a signed,
//! serialized transaction ready to be placed in a payment payload.

use std::future::Future;
use std::pin::Pin;

use crate::error::{ErrorCode, PaymentError};
use crate::proto::PaymentRequirement;

/// A boxed future, used by object-safe async traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A signed transaction ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// Base64 serialized transaction.
    pub transaction: String,
    /// Base58 signature of the payer.
    pub signature: String,
}

/// Failure inside a wallet implementation.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// The payer's balance does not cover the transfer.
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    /// The wallet owner declined to sign.
    #[error("signing rejected: {0}")]
    Rejected(String),
    /// The requirement cannot be expressed as a transfer.
    #[error("invalid requirement: {0}")]
    InvalidRequirement(String),
    /// A transaction handed to the wallet could not be decoded or signed.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),
    /// Chain RPC failed while building the transfer.
    #[error("rpc error: {0}")]
    Rpc(String),
    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl From<WalletError> for PaymentError {
    fn from(err: WalletError) -> Self {
        let code = match &err {
            WalletError::InsufficientFunds(_) => ErrorCode::InsufficientFunds,
            WalletError::InvalidRequirement(_) => ErrorCode::InvalidRequirement,
            _ => ErrorCode::WalletError,
        };
        Self::new(code, format!("Wallet failed: {err}"))
    }
}

/// A wallet able to pay x402 requirements.
///
/// Methods return [`BoxFuture`] so the trait stays object safe and managers
/// can hold `&dyn PaymentWallet`.
pub trait PaymentWallet: Send + Sync {
    /// The payer's address.
    fn address(&self) -> String;

    /// Builds a transfer satisfying `requirement` and signs it fully.
    fn build_and_sign<'a>(
        &'a self,
        requirement: &'a PaymentRequirement,
    ) -> BoxFuture<'a, Result<SignedTransaction, WalletError>>;

    /// Adds the payer's signature to a server-built transaction.
    ///
    /// Other signature slots (the sponsoring fee payer) are left as they are.
    fn partially_sign<'a>(
        &'a self,
        transaction: &'a str,
    ) -> BoxFuture<'a, Result<SignedTransaction, WalletError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_error_mapping() {
        let err: PaymentError = WalletError::InsufficientFunds("need 1.5 USDC".into()).into();
        assert_eq!(err.code, ErrorCode::InsufficientFunds);
        assert!(err.message.contains("need 1.5 USDC"));

        let err: PaymentError = WalletError::Rpc("connection refused".into()).into();
        assert_eq!(err.code, ErrorCode::WalletError);
    }
}
