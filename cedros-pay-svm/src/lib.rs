#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Solana wallet for the Cedros Pay x402 client.
//!
//! [`SolanaWallet`] implements [`PaymentWallet`](cedros_pay::wallet::PaymentWallet)
//! with an SPL `TransferChecked` from the payer's associated token account.
//! It supports both SPL Token and Token-2022 mints, attaches the
//! requirement's memo, and leaves a sponsoring fee payer's signature slot
//! untouched so the server can co-sign.
//!
//! # Modules
//!
//! - [`wallet`] - Transfer construction and the wallet itself
//! - [`transaction`] - Base64/bincode codec and partial signing
//! - [`rpc`] - The RPC calls the wallet depends on
//! - [`error`] - [`SolanaWalletError`]
//!
//! # Example
//!
//! ```ignore
//! use cedros_pay_svm::SolanaWallet;
//! use solana_keypair::Keypair;
//!
//! let wallet = SolanaWallet::with_rpc_url(Keypair::new(), "https://api.devnet.solana.com");
//! let receipt = manager.process_payment("article-42", None, &wallet, None).await?;
//! ```
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod error;
pub mod rpc;
pub mod transaction;
pub mod wallet;

pub use error::SolanaWalletError;
pub use rpc::SolanaRpc;
pub use wallet::{MintInfo, SolanaWallet};
