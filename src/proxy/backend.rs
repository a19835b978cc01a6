//! Capabilities the checking pipeline consumes
//!
//! The pipeline never dials or probes anything itself. It asks a
//! [`CheckBackend`] for a client bound to a definition and runs the probes
//! through it, which keeps the orchestration testable without a network.

use crate::proxy::checker::CheckerConfig;
use crate::proxy::client::HttpProxyClient;
use crate::proxy::geo::{self, GeoLocator};
use crate::proxy::models::{Platform, Proxy, ProxyDefinition};
use crate::proxy::platform;
use crate::Result;
use anyhow::anyhow;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// A network client bound to one proxy definition
pub trait ProxyClient: Send + Sync {
    /// Release pooled connections. Must be idempotent and must not fail.
    fn close(&mut self);
}

/// Dialing, probing and geo lookup for proxy definitions
#[async_trait]
pub trait CheckBackend: Send + Sync + 'static {
    type Client: ProxyClient;

    /// Build a client for `proxy`, or `None` for unsupported or malformed
    /// definitions
    fn build_client(&self, proxy: &ProxyDefinition) -> Option<Self::Client>;

    /// Probe one platform through `client`
    async fn probe(&self, platform: Platform, client: &Self::Client) -> Result<bool>;

    /// Download rate through `client` in KB/s
    async fn measure_throughput(&self, client: &Self::Client) -> Result<u64>;

    /// Country code of the proxy's egress address, if it can be determined
    async fn resolve_geo_label(
        &self,
        client: &Self::Client,
        proxy: &ProxyDefinition,
    ) -> Option<String>;
}

/// Closes the wrapped client when dropped, whichever way a check exits
pub struct ClientGuard<C: ProxyClient> {
    client: C,
}

impl<C: ProxyClient> ClientGuard<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

impl<C: ProxyClient> Drop for ClientGuard<C> {
    fn drop(&mut self) {
        self.client.close();
    }
}

/// Backend dialing through reqwest and probing the public endpoints
pub struct HttpBackend {
    timeout: Duration,
    speed_test_url: Option<String>,
    retries: u32,
    geo_locator: Option<GeoLocator>,
}

impl HttpBackend {
    pub fn from_config(config: &CheckerConfig) -> Self {
        let geo_locator = config.mmdb_path.as_ref().and_then(|path| {
            GeoLocator::from_path(path)
                .map_err(|e| warn!("Failed to open MMDB database {}: {}", path, e))
                .ok()
        });

        Self {
            timeout: config.timeout,
            speed_test_url: config.speed_test_url.clone(),
            retries: config.retries,
            geo_locator,
        }
    }
}

#[async_trait]
impl CheckBackend for HttpBackend {
    type Client = HttpProxyClient;

    fn build_client(&self, proxy: &ProxyDefinition) -> Option<HttpProxyClient> {
        let Some(endpoint) = Proxy::from_definition(proxy) else {
            debug!(
                "Unsupported proxy definition {} (type {:?})",
                proxy,
                proxy.proxy_type()
            );
            return None;
        };

        match HttpProxyClient::connect(&endpoint, self.timeout) {
            Ok(client) => Some(client),
            Err(e) => {
                debug!("Failed to create client for {}: {}", proxy, e);
                None
            }
        }
    }

    async fn probe(&self, platform: Platform, client: &HttpProxyClient) -> Result<bool> {
        platform::check_platform(client.inner()?, platform).await
    }

    async fn measure_throughput(&self, client: &HttpProxyClient) -> Result<u64> {
        let url = self
            .speed_test_url
            .as_deref()
            .ok_or_else(|| anyhow!("no speed test url configured"))?;
        platform::measure_speed(client.inner()?, url).await
    }

    async fn resolve_geo_label(
        &self,
        client: &HttpProxyClient,
        proxy: &ProxyDefinition,
    ) -> Option<String> {
        if let Ok(inner) = client.inner() {
            if let Some(loc) = geo::resolve_via_trace(inner, self.retries).await {
                return Some(loc);
            }
        }

        let locator = self.geo_locator.as_ref()?;
        locator
            .lookup_host(proxy.server()?, proxy.port().unwrap_or(0))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingClient {
        closes: Arc<AtomicUsize>,
    }

    impl ProxyClient for CountingClient {
        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_guard_closes_on_drop() {
        let closes = Arc::new(AtomicUsize::new(0));
        {
            let guard = ClientGuard::new(CountingClient {
                closes: Arc::clone(&closes),
            });
            let _ = guard.client();
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
