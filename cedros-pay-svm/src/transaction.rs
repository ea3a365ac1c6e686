//! Serialization and signing of versioned transactions.

use cedros_pay::encoding::{decode_bytes, encode_bytes};
use solana_signature::Signature;
use solana_signer::Signer;
use solana_transaction::versioned::VersionedTransaction;

use crate::error::SolanaWalletError;

/// Decodes a `base64(bincode)` transaction.
///
/// # Errors
///
/// Returns [`SolanaWalletError::Decode`] if either layer is malformed.
pub fn decode_transaction(encoded: &str) -> Result<VersionedTransaction, SolanaWalletError> {
    let bytes = decode_bytes(encoded).map_err(|e| SolanaWalletError::Decode(e.to_string()))?;
    bincode::deserialize(&bytes).map_err(|e| SolanaWalletError::Decode(e.to_string()))
}

/// Encodes a transaction as `base64(bincode)`.
///
/// # Errors
///
/// Returns [`SolanaWalletError::Encode`] if serialization fails.
pub fn encode_transaction(transaction: &VersionedTransaction) -> Result<String, SolanaWalletError> {
    let bytes =
        bincode::serialize(transaction).map_err(|e| SolanaWalletError::Encode(e.to_string()))?;
    Ok(encode_bytes(bytes))
}

/// Places `signer`'s signature in its slot among the required signers.
///
/// Missing slots are padded with the default signature; slots belonging to
/// other signers keep whatever they held.
///
/// # Errors
///
/// Returns [`SolanaWalletError::SignerNotRequired`] if `signer` is not a
/// required signer, or [`SolanaWalletError::Sign`] if signing fails.
pub fn sign_partial<S: Signer + ?Sized>(
    mut transaction: VersionedTransaction,
    signer: &S,
) -> Result<(VersionedTransaction, Signature), SolanaWalletError> {
    let pubkey = signer.pubkey();
    let required = usize::from(transaction.message.header().num_required_signatures);
    let position = transaction
        .message
        .static_account_keys()
        .iter()
        .take(required)
        .position(|key| *key == pubkey)
        .ok_or(SolanaWalletError::SignerNotRequired(pubkey))?;

    let signature = signer
        .try_sign_message(&transaction.message.serialize())
        .map_err(|e| SolanaWalletError::Sign(e.to_string()))?;
    if transaction.signatures.len() < required {
        transaction.signatures.resize(required, Signature::default());
    }
    transaction.signatures[position] = signature;
    Ok((transaction, signature))
}

/// Whether every required signature slot holds a non-default signature.
#[must_use]
pub fn is_fully_signed(transaction: &VersionedTransaction) -> bool {
    let required = usize::from(transaction.message.header().num_required_signatures);
    let default = Signature::default();
    transaction.signatures.len() >= required
        && transaction.signatures.iter().all(|s| *s != default)
}
