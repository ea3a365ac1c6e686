//! Error types for the Solana wallet.

use cedros_pay::wallet::WalletError;
use solana_pubkey::Pubkey;

/// Failures while building, signing or encoding a Solana payment.
#[derive(Debug, thiserror::Error)]
pub enum SolanaWalletError {
    /// A requirement field is not a valid base58 public key.
    #[error("invalid {field} address `{value}`")]
    InvalidAddress {
        /// Requirement field the address came from.
        field: &'static str,
        /// The offending value.
        value: String,
    },
    /// The requirement amount is not an unsigned integer.
    #[error("invalid amount `{0}`")]
    InvalidAmount(String),
    /// The mint account does not exist.
    #[error("mint {0} not found")]
    MintNotFound(Pubkey),
    /// The mint is owned by neither token program.
    #[error("mint {mint} is owned by {owner}, not a token program")]
    UnsupportedMint {
        /// Mint address.
        mint: Pubkey,
        /// Actual owner program.
        owner: Pubkey,
    },
    /// The requirement states different decimals than the mint.
    #[error("requirement says {stated} decimals, mint {mint} has {actual}")]
    DecimalsMismatch {
        /// Mint address.
        mint: Pubkey,
        /// Decimals from the requirement.
        stated: u8,
        /// Decimals from the chain.
        actual: u8,
    },
    /// The payer has no token account for the mint.
    #[error("no token account {account} for mint {mint}")]
    MissingTokenAccount {
        /// Expected associated token account.
        account: Pubkey,
        /// Mint address.
        mint: Pubkey,
    },
    /// The payer's balance is below the required amount.
    #[error("balance {available} is below the required {required}")]
    InsufficientBalance {
        /// Atomic units required.
        required: u64,
        /// Atomic units held.
        available: u64,
    },
    /// An account could not be unpacked.
    #[error("cannot unpack account {account}: {reason}")]
    Unpack {
        /// The account.
        account: Pubkey,
        /// Unpack error.
        reason: String,
    },
    /// An RPC call failed.
    #[error("rpc error: {0}")]
    Rpc(String),
    /// A transfer instruction or message could not be built.
    #[error("cannot build transaction: {0}")]
    Build(String),
    /// The wallet's key is not among the transaction's required signers.
    #[error("{0} is not a required signer of the transaction")]
    SignerNotRequired(Pubkey),
    /// Signing failed.
    #[error("cannot sign transaction: {0}")]
    Sign(String),
    /// A transaction could not be decoded from base64 and bincode.
    #[error("cannot decode transaction: {0}")]
    Decode(String),
    /// A transaction could not be serialized.
    #[error("cannot encode transaction: {0}")]
    Encode(String),
}

impl From<SolanaWalletError> for WalletError {
    fn from(err: SolanaWalletError) -> Self {
        match err {
            SolanaWalletError::InsufficientBalance { .. }
            | SolanaWalletError::MissingTokenAccount { .. } => {
                Self::InsufficientFunds(err.to_string())
            }
            SolanaWalletError::InvalidAddress { .. }
            | SolanaWalletError::InvalidAmount(_)
            | SolanaWalletError::MintNotFound(_)
            | SolanaWalletError::UnsupportedMint { .. }
            | SolanaWalletError::DecimalsMismatch { .. } => {
                Self::InvalidRequirement(err.to_string())
            }
            SolanaWalletError::SignerNotRequired(_) | SolanaWalletError::Decode(_) => {
                Self::InvalidTransaction(err.to_string())
            }
            SolanaWalletError::Rpc(_) | SolanaWalletError::Unpack { .. } => {
                Self::Rpc(err.to_string())
            }
            SolanaWalletError::Build(_)
            | SolanaWalletError::Sign(_)
            | SolanaWalletError::Encode(_) => Self::Other(err.to_string()),
        }
    }
}
