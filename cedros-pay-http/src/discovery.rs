//! Discovery of the backend's API route prefix.
//!
//! Cedros backends may be mounted under a path prefix (e.g. `/api`). The
//! prefix is advertised by `GET /cedros-health` as `{"routePrefix": "..."}`.
//! [`RouteDiscovery`] fetches it once and caches it:
//!
//! - a 2xx answer is cached
//! - a 4xx answer means "no health endpoint": an empty prefix is cached
//! - transient failures are retried with doubling delays; if they persist the
//!   empty prefix is used for this call only and nothing is cached
//!
//! Concurrent callers share one in-flight discovery, so at most one health
//! request is outstanding at any time.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};

use crate::constants::{HEALTH_PATH, IDEMPOTENCY_KEY_HEADER};
use crate::transport::{HttpTransport, new_idempotency_key};

/// Retry parameters for discovery.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscoveryConfig {
    /// Retries after the first health request.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each subsequent one.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "baseDelayMs")]
    pub base_delay: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    #[serde(default)]
    route_prefix: Option<String>,
}

enum Probe {
    Found(String),
    Missing,
    Transient,
}

#[derive(Default)]
struct DiscoveryState {
    prefix: Option<String>,
    in_flight: Option<Shared<BoxFuture<'static, String>>>,
    generation: u64,
}

struct DiscoveryInner {
    server_url: String,
    transport: HttpTransport,
    config: DiscoveryConfig,
    state: Mutex<DiscoveryState>,
}

/// Resolves and caches the backend's route prefix.
///
/// Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct RouteDiscovery {
    inner: Arc<DiscoveryInner>,
}

impl fmt::Debug for RouteDiscovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDiscovery")
            .field("server_url", &self.inner.server_url)
            .field("prefix", &self.inner.state.lock().prefix)
            .finish_non_exhaustive()
    }
}

impl RouteDiscovery {
    /// Creates a discovery for the backend at `server_url`.
    #[must_use]
    pub fn new(server_url: &str, transport: HttpTransport, config: DiscoveryConfig) -> Self {
        Self {
            inner: Arc::new(DiscoveryInner {
                server_url: server_url.trim_end_matches('/').to_owned(),
                transport,
                config,
                state: Mutex::new(DiscoveryState::default()),
            }),
        }
    }

    /// The backend base URL, without trailing slash.
    #[must_use]
    pub fn server_url(&self) -> &str {
        &self.inner.server_url
    }

    /// The cached prefix, if discovery has completed.
    #[must_use]
    pub fn cached_prefix(&self) -> Option<String> {
        self.inner.state.lock().prefix.clone()
    }

    /// Returns the route prefix, discovering it if necessary.
    ///
    /// Never fails: an unreachable health endpoint yields `""`.
    pub async fn discover_prefix(&self) -> String {
        let discovery = {
            let mut state = self.inner.state.lock();
            if let Some(prefix) = &state.prefix {
                return prefix.clone();
            }
            match &state.in_flight {
                Some(discovery) => discovery.clone(),
                None => {
                    let inner = Arc::clone(&self.inner);
                    let generation = state.generation;
                    let discovery = async move { inner.run(generation).await }
                        .boxed()
                        .shared();
                    state.in_flight = Some(discovery.clone());
                    discovery
                }
            }
        };
        discovery.await
    }

    /// Builds the full URL for an API `path`, e.g. `/paywall/v1/quote`.
    pub async fn build_url(&self, path: &str) -> String {
        let prefix = self.discover_prefix().await;
        let separator = if path.starts_with('/') { "" } else { "/" };
        format!("{}{prefix}{separator}{path}", self.inner.server_url)
    }

    /// Forgets the cached prefix. A discovery already in flight completes for
    /// its own callers but does not repopulate the cache.
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        state.prefix = None;
        state.in_flight = None;
        state.generation = state.generation.wrapping_add(1);
    }
}

impl DiscoveryInner {
    async fn run(&self, generation: u64) -> String {
        let mut attempt = 0;
        let (prefix, cache) = loop {
            match self.probe().await {
                Probe::Found(prefix) => break (prefix, true),
                Probe::Missing => break (String::new(), true),
                Probe::Transient if attempt < self.config.max_retries => {
                    let delay = self
                        .config
                        .base_delay
                        .saturating_mul(2_u32.saturating_pow(attempt));
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Probe::Transient => break (String::new(), false),
            }
        };

        #[cfg(feature = "telemetry")]
        tracing::debug!(prefix = %prefix, cached = cache, "route discovery finished");

        let mut state = self.state.lock();
        if state.generation == generation {
            if cache {
                state.prefix = Some(prefix.clone());
            }
            state.in_flight = None;
        }
        prefix
    }

    async fn probe(&self) -> Probe {
        let request = self
            .transport
            .client()
            .get(format!("{}{HEALTH_PATH}", self.server_url))
            .header(IDEMPOTENCY_KEY_HEADER, new_idempotency_key());
        let response = match self.transport.send(request, "GET /cedros-health", None).await {
            Ok(response) => response,
            Err(_err) => {
                #[cfg(feature = "telemetry")]
                tracing::debug!(error = %_err, "health check failed");
                return Probe::Transient;
            }
        };
        if response.status.is_success() {
            let health: HealthResponse = serde_json::from_slice(&response.body).unwrap_or_default();
            Probe::Found(normalize_prefix(health.route_prefix.as_deref().unwrap_or_default()))
        } else if response.status.is_client_error() {
            Probe::Missing
        } else {
            Probe::Transient
        }
    }
}

/// Normalises a prefix to a leading `/` and no trailing `/`; blank stays blank.
fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}
