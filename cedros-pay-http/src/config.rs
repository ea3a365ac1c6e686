//! Manager configuration.

use std::time::Duration;

use cedros_pay::networks::SolanaCluster;
use cedros_pay::resilience::{
    CircuitBreakerConfig, RateLimitConfig, ResilienceConfig, RetryConfig,
};
use cedros_pay::{ErrorCode, PaymentError};
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use url::Url;

use crate::discovery::DiscoveryConfig;
use crate::transport::DEFAULT_TIMEOUT;

/// Configuration of one manager bundle.
///
/// Field names follow the JSON the web SDK is configured with. Durations are
/// milliseconds on the wire.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerConfig {
    /// Stripe publishable key, empty when the card rail is unused.
    #[serde(default)]
    pub stripe_public_key: String,
    /// Base URL of the Cedros backend.
    pub server_url: String,
    /// Cluster quotes are expected on.
    #[serde(default)]
    pub solana_cluster: SolanaCluster,
    /// Custom RPC endpoint for wallets built from this config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solana_endpoint: Option<String>,
    /// Accept quotes for mints outside the known stablecoin list.
    #[serde(default)]
    pub allow_unknown_mint: bool,
    /// Per-request timeout.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "timeoutMs", default = "default_timeout")]
    pub timeout: Duration,
    /// Resilience settings of the crypto rail.
    #[serde(default)]
    pub x402: ResilienceConfig,
    /// Resilience settings of the card rail.
    #[serde(default)]
    pub stripe: ResilienceConfig,
    /// Route discovery retry settings.
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

const fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// The fields that identify a shareable manager bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManagerKey {
    stripe_public_key: String,
    server_url: String,
    solana_cluster: SolanaCluster,
    solana_endpoint: Option<String>,
    allow_unknown_mint: bool,
}

impl ManagerConfig {
    /// Creates a config with defaults for everything but the server URL.
    #[must_use]
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            stripe_public_key: String::new(),
            server_url: server_url.into(),
            solana_cluster: SolanaCluster::default(),
            solana_endpoint: None,
            allow_unknown_mint: false,
            timeout: DEFAULT_TIMEOUT,
            x402: ResilienceConfig::default(),
            stripe: ResilienceConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }

    /// Sets the Stripe publishable key.
    #[must_use]
    pub fn with_stripe_public_key(mut self, key: impl Into<String>) -> Self {
        self.stripe_public_key = key.into();
        self
    }

    /// Sets the Solana cluster.
    #[must_use]
    pub const fn with_solana_cluster(mut self, cluster: SolanaCluster) -> Self {
        self.solana_cluster = cluster;
        self
    }

    /// Sets a custom RPC endpoint.
    #[must_use]
    pub fn with_solana_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.solana_endpoint = Some(endpoint.into());
        self
    }

    /// Allows mints outside the known stablecoin list.
    #[must_use]
    pub const fn with_allow_unknown_mint(mut self, allow: bool) -> Self {
        self.allow_unknown_mint = allow;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the rate limit of both rails.
    #[must_use]
    pub const fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.x402.rate_limit = rate_limit;
        self.stripe.rate_limit = rate_limit;
        self
    }

    /// Sets the breaker parameters of both rails.
    #[must_use]
    pub const fn with_circuit_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.x402.circuit_breaker = breaker;
        self.stripe.circuit_breaker = breaker;
        self
    }

    /// Sets the retry parameters of both rails.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.x402.retry = retry;
        self.stripe.retry = retry;
        self
    }

    /// Sets route discovery retry parameters.
    #[must_use]
    pub const fn with_discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }

    /// RPC endpoint: the custom one, or the cluster's public endpoint.
    #[must_use]
    pub fn rpc_url(&self) -> &str {
        self.solana_endpoint
            .as_deref()
            .unwrap_or_else(|| self.solana_cluster.default_rpc_url())
    }

    /// The identity under which bundles are shared by a manager cache.
    #[must_use]
    pub fn cache_key(&self) -> ManagerKey {
        ManagerKey {
            stripe_public_key: self.stripe_public_key.clone(),
            server_url: self.server_url.trim_end_matches('/').to_owned(),
            solana_cluster: self.solana_cluster,
            solana_endpoint: self.solana_endpoint.clone(),
            allow_unknown_mint: self.allow_unknown_mint,
        }
    }

    /// Checks the config before any manager is built.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::InvalidConfig`] for a server URL that is not
    /// `http(s)`, a zero timeout, or a malformed RPC endpoint.
    pub fn validate(&self) -> Result<(), PaymentError> {
        check_http_url("serverUrl", &self.server_url)?;
        if let Some(endpoint) = &self.solana_endpoint {
            check_http_url("solanaEndpoint", endpoint)?;
        }
        if self.timeout.is_zero() {
            return Err(PaymentError::new(
                ErrorCode::InvalidConfig,
                "timeoutMs must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn check_http_url(field: &str, value: &str) -> Result<(), PaymentError> {
    let url = Url::parse(value).map_err(|e| {
        PaymentError::new(
            ErrorCode::InvalidConfig,
            format!("{field} `{value}` is not a valid URL: {e}"),
        )
    })?;
    if matches!(url.scheme(), "http" | "https") {
        Ok(())
    } else {
        Err(PaymentError::new(
            ErrorCode::InvalidConfig,
            format!("{field} `{value}` must use http or https"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal() {
        let config: ManagerConfig =
            serde_json::from_str(r#"{"serverUrl": "https://pay.example.com"}"#).unwrap();
        assert_eq!(config, ManagerConfig::new("https://pay.example.com"));
        assert_eq!(config.rpc_url(), "https://api.mainnet-beta.solana.com");
    }

    #[test]
    fn test_deserialize_full() {
        let config: ManagerConfig = serde_json::from_str(
            r#"{
                "stripePublicKey": "pk_test_123",
                "serverUrl": "https://pay.example.com/",
                "solanaCluster": "devnet",
                "solanaEndpoint": "https://rpc.example.com",
                "allowUnknownMint": true,
                "timeoutMs": 2500,
                "x402": {
                    "rateLimit": {"maxRequests": 3, "windowMs": 1000},
                    "circuitBreaker": {"failureThreshold": 2, "timeoutMs": 5000},
                    "retry": {"maxRetries": 1, "initialDelayMs": 100, "backoffFactor": 2.0, "maxDelayMs": 400, "jitter": false}
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.solana_cluster, SolanaCluster::Devnet);
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.x402.rate_limit.max_requests, 3);
        assert_eq!(config.x402.circuit_breaker.failure_threshold, 2);
        assert_eq!(config.x402.retry.max_retries, 1);
        assert_eq!(config.stripe, ResilienceConfig::default());
        assert_eq!(config.rpc_url(), "https://rpc.example.com");
    }

    #[test]
    fn test_cache_key_ignores_tuning() {
        let a = ManagerConfig::new("https://pay.example.com/");
        let b = ManagerConfig::new("https://pay.example.com").with_timeout(Duration::from_secs(1));
        assert_eq!(a.cache_key(), b.cache_key());

        let c = a.clone().with_allow_unknown_mint(true);
        assert_ne!(a.cache_key(), c.cache_key());
    }

    #[test]
    fn test_validate() {
        assert!(ManagerConfig::new("https://pay.example.com").validate().is_ok());
        let err = ManagerConfig::new("ftp://pay.example.com").validate().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidConfig);
        assert!(ManagerConfig::new("not a url").validate().is_err());
        assert!(
            ManagerConfig::new("https://pay.example.com")
                .with_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }
}
