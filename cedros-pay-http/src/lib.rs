#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP layer of the Cedros Pay x402 client.
//!
//! Provides the timeout-bounded transport, header codecs, route discovery
//! and the payment managers built on top of them.
//!
//! # Modules
//!
//! - [`constants`] - HTTP header names, status codes, API paths
//! - [`headers`] - Base64 encoding/decoding for x402 HTTP headers
//! - [`error`] - HTTP transport error types
//! - [`transport`] - Timeout and cancellation around single exchanges
//! - [`discovery`] - Backend route prefix discovery
//! - [`x402`] - Quote, sign, submit and settle crypto payments
//! - [`stripe`] - Hosted card checkout sessions
//! - [`config`] - Manager configuration
//! - [`cache`] - Shared, reference-counted manager bundles
//!
//! # Example
//!
//! ```no_run
//! use cedros_pay_http::{ManagerCache, ManagerConfig};
//!
//! # fn main() -> Result<(), cedros_pay::PaymentError> {
//! let cache = ManagerCache::new();
//! let config = ManagerConfig::new("https://pay.example.com");
//! let bundle = cache.get_or_create(&config)?;
//! # let _ = bundle;
//! cache.release(&config);
//! # Ok(())
//! # }
//! ```
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod cache;
pub mod config;
pub mod constants;
pub mod discovery;
pub mod error;
pub mod headers;
pub mod stripe;
pub mod transport;
pub mod x402;

pub use cache::{ManagerBundle, ManagerCache};
pub use config::{ManagerConfig, ManagerKey};
pub use discovery::{DiscoveryConfig, RouteDiscovery};
pub use error::{HttpError, TransportError};
pub use stripe::StripeManager;
pub use transport::{CancelSignal, HttpResponse, HttpTransport};
pub use x402::{PaymentReceipt, Quote, X402Manager};
