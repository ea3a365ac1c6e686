//! The slice of Solana RPC the wallet needs.

use cedros_pay::wallet::BoxFuture;
use solana_account::Account;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_message::Hash;
use solana_pubkey::Pubkey;

use crate::error::SolanaWalletError;

/// Read-only chain access used while building a transfer.
///
/// Implemented for the nonblocking [`RpcClient`]; tests substitute an
/// in-memory ledger.
pub trait SolanaRpc: Send + Sync {
    /// Fetches an account, `None` if it does not exist.
    fn get_account<'a>(
        &'a self,
        pubkey: &'a Pubkey,
    ) -> BoxFuture<'a, Result<Option<Account>, SolanaWalletError>>;

    /// Fetches a recent blockhash to build against.
    fn get_latest_blockhash(&self) -> BoxFuture<'_, Result<Hash, SolanaWalletError>>;
}

impl SolanaRpc for RpcClient {
    fn get_account<'a>(
        &'a self,
        pubkey: &'a Pubkey,
    ) -> BoxFuture<'a, Result<Option<Account>, SolanaWalletError>> {
        Box::pin(async move {
            let response = self
                .get_account_with_commitment(pubkey, self.commitment())
                .await
                .map_err(|e| SolanaWalletError::Rpc(format!("getAccountInfo {pubkey}: {e}")))?;
            Ok(response.value)
        })
    }

    fn get_latest_blockhash(&self) -> BoxFuture<'_, Result<Hash, SolanaWalletError>> {
        Box::pin(async move {
            Self::get_latest_blockhash(self)
                .await
                .map_err(|e| SolanaWalletError::Rpc(format!("getLatestBlockhash: {e}")))
        })
    }
}
