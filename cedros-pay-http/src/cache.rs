//! Shared, reference-counted manager bundles.
//!
//! Several payment widgets on one page usually point at the same backend.
//! [`ManagerCache`] lets them share one HTTP client, one route discovery and
//! one breaker per rail instead of each building its own. Entries are keyed
//! by [`ManagerKey`] and live exactly as long as their reference count is
//! positive.
//!
//! The cache is a plain value: create one per application and pass it where
//! it is needed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use cedros_pay::PaymentError;
use parking_lot::Mutex;

use crate::config::{ManagerConfig, ManagerKey};
use crate::discovery::RouteDiscovery;
use crate::stripe::StripeManager;
use crate::transport::HttpTransport;
use crate::x402::X402Manager;

/// The managers built from one [`ManagerConfig`].
#[derive(Debug)]
pub struct ManagerBundle {
    /// Crypto rail.
    pub x402: X402Manager,
    /// Card rail.
    pub stripe: StripeManager,
    /// Route discovery shared by both rails.
    pub routes: RouteDiscovery,
}

impl ManagerBundle {
    /// Builds a fresh bundle with one transport shared by both managers.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::InvalidConfig`](cedros_pay::ErrorCode::InvalidConfig)
    /// if the config does not validate or the HTTP client cannot be built.
    pub fn build(config: &ManagerConfig) -> Result<Self, PaymentError> {
        config.validate()?;
        let transport = HttpTransport::new(config.timeout)?;
        let routes = RouteDiscovery::new(&config.server_url, transport.clone(), config.discovery);
        let x402 = X402Manager::new(
            transport.clone(),
            routes.clone(),
            &config.x402,
            config.solana_cluster,
        )
        .with_allow_unknown_mint(config.allow_unknown_mint);
        let stripe = StripeManager::new(
            transport,
            routes.clone(),
            &config.stripe,
            config.stripe_public_key.clone(),
        );
        Ok(Self {
            x402,
            stripe,
            routes,
        })
    }
}

struct Entry {
    bundle: Arc<ManagerBundle>,
    ref_count: usize,
}

/// Reference-counted bundles keyed by configuration.
#[derive(Default)]
pub struct ManagerCache {
    entries: Mutex<HashMap<ManagerKey, Entry>>,
}

impl fmt::Debug for ManagerCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerCache")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl ManagerCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bundle for `config`, building it on first use.
    ///
    /// Every successful call must be paired with a [`release`](Self::release).
    ///
    /// # Errors
    ///
    /// Returns the build error of [`ManagerBundle::build`]. A failed build
    /// leaves the cache unchanged.
    pub fn get_or_create(&self, config: &ManagerConfig) -> Result<Arc<ManagerBundle>, PaymentError> {
        let key = config.cache_key();
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&key) {
            entry.ref_count += 1;

            #[cfg(feature = "telemetry")]
            tracing::debug!(server_url = %config.server_url, ref_count = entry.ref_count, "reusing manager bundle");

            return Ok(Arc::clone(&entry.bundle));
        }
        let bundle = Arc::new(ManagerBundle::build(config)?);

        #[cfg(feature = "telemetry")]
        tracing::debug!(server_url = %config.server_url, "created manager bundle");

        entries.insert(
            key,
            Entry {
                bundle: Arc::clone(&bundle),
                ref_count: 1,
            },
        );
        Ok(bundle)
    }

    /// Drops one reference to the bundle for `config`, removing it at zero.
    ///
    /// Returns `false` if no bundle is cached for `config`.
    pub fn release(&self, config: &ManagerConfig) -> bool {
        let key = config.cache_key();
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&key) else {
            return false;
        };
        entry.ref_count -= 1;
        if entry.ref_count == 0 {
            entries.remove(&key);

            #[cfg(feature = "telemetry")]
            tracing::debug!(server_url = %config.server_url, "removed manager bundle");
        }
        true
    }

    /// Current reference count for `config`, zero if not cached.
    #[must_use]
    pub fn ref_count(&self, config: &ManagerConfig) -> usize {
        self.entries
            .lock()
            .get(&config.cache_key())
            .map_or(0, |entry| entry.ref_count)
    }

    /// Number of cached bundles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if no bundle is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use cedros_pay::ErrorCode;
    use cedros_pay::networks::SolanaCluster;

    fn config() -> ManagerConfig {
        ManagerConfig::new("https://pay.example.com").with_stripe_public_key("pk_test_123")
    }

    #[test]
    fn test_shares_bundle_and_counts_references() {
        let cache = ManagerCache::new();
        let a = cache.get_or_create(&config()).unwrap();
        let b = cache
            .get_or_create(&config().with_timeout(Duration::from_secs(3)))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.ref_count(&config()), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(b.stripe.public_key(), "pk_test_123");
    }

    #[test]
    fn test_distinct_keys_get_distinct_bundles() {
        let cache = ManagerCache::new();
        let mainnet = cache.get_or_create(&config()).unwrap();
        let devnet_config = config().with_solana_cluster(SolanaCluster::Devnet);
        let devnet = cache.get_or_create(&devnet_config).unwrap();
        assert!(!Arc::ptr_eq(&mainnet, &devnet));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_release_removes_at_zero() {
        let cache = ManagerCache::new();
        let _a = cache.get_or_create(&config()).unwrap();
        let _b = cache.get_or_create(&config()).unwrap();

        assert!(cache.release(&config()));
        assert_eq!(cache.ref_count(&config()), 1);
        assert!(cache.release(&config()));
        assert_eq!(cache.ref_count(&config()), 0);
        assert!(cache.is_empty());

        assert!(!cache.release(&config()));
    }

    #[test]
    fn test_rebuild_after_release() {
        let cache = ManagerCache::new();
        let first = cache.get_or_create(&config()).unwrap();
        cache.release(&config());
        let second = cache.get_or_create(&config()).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_invalid_config_is_not_cached() {
        let cache = ManagerCache::new();
        let err = cache
            .get_or_create(&ManagerConfig::new("ftp://pay.example.com"))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidConfig);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_rails_have_separate_breakers() {
        let cache = ManagerCache::new();
        let bundle = cache.get_or_create(&config()).unwrap();
        assert_eq!(bundle.x402.invoker().breaker().name(), "x402");
        assert_eq!(bundle.stripe.invoker().breaker().name(), "stripe");
    }
}
