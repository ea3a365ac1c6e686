#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the Cedros Pay x402 client.
//!
//! Cedros Pay backends answer a request for a paid resource with HTTP 402
//! and a payment requirement. The client signs a Solana SPL token transfer
//! meeting that requirement and submits it in the `X-PAYMENT` header; the
//! server verifies, settles, and reports back in `X-PAYMENT-RESPONSE`.
//!
//! This crate is transport-agnostic. It holds what every layer shares:
//!
//! - [`proto`] - Wire format types and the quote parser
//! - [`error`] - [`ErrorCode`](error::ErrorCode) and [`PaymentError`](error::PaymentError)
//! - [`wallet`] - The [`PaymentWallet`](wallet::PaymentWallet) capability
//! - [`resilience`] - Rate limiter, circuit breaker, retry policy, and their combination
//! - [`networks`] - Solana clusters and accepted stablecoin mints
//! - [`encoding`] - Base64 helpers for header transport
//!
//! The HTTP managers live in `cedros-pay-http`; a Solana wallet lives in
//! `cedros-pay-svm`.
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod encoding;
pub mod error;
pub mod networks;
pub mod proto;
pub mod resilience;
pub mod wallet;

pub use error::{ErrorCode, PaymentError};
