//! Subscription retrieval
//!
//! Sources are either `http(s)://` URLs or local file paths. Each source is
//! retried a few times; a source that keeps failing is skipped, and the run
//! only aborts when no source succeeds at all.

use crate::error::FetchError;
use crate::proxy::client::DEFAULT_USER_AGENT;
use crate::proxy::models::{ProxyDefinition, ProxyType};
use crate::proxy::parser::ProxyParser;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for subscription downloads in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default attempts per source
const DEFAULT_RETRIES: u32 = 3;

/// Configuration for subscription retrieval
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Timeout for HTTP requests
    pub timeout: Duration,
    /// Attempts per source
    pub retries: u32,
    /// Protocol assumed for bare `host:port` lines
    pub default_proxy_type: ProxyType,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retries: DEFAULT_RETRIES,
            default_proxy_type: ProxyType::Http,
        }
    }
}

impl FetcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_proxy_type(mut self, proxy_type: ProxyType) -> Self {
        self.default_proxy_type = proxy_type;
        self
    }
}

/// Fetches and decodes subscription sources
pub struct SubscriptionFetcher {
    config: FetcherConfig,
    client: Client,
}

impl SubscriptionFetcher {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_config(FetcherConfig::default())
    }

    pub fn with_config(config: FetcherConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;

        Ok(Self { config, client })
    }

    /// Fetch every source and concatenate the definitions in source order
    pub async fn fetch_all(&self, sources: &[String]) -> Result<Vec<ProxyDefinition>, FetchError> {
        if sources.is_empty() {
            return Err(FetchError::NoSources);
        }

        let mut definitions = Vec::new();
        let mut failed = 0;

        for source in sources {
            match self.fetch_with_retry(source).await {
                Ok(fetched) => {
                    info!("Fetched {} proxies from {}", fetched.len(), source);
                    definitions.extend(fetched);
                }
                Err(e) => {
                    warn!("Failed to fetch {}: {}", source, e);
                    failed += 1;
                }
            }
        }

        if failed == sources.len() {
            return Err(FetchError::AllSourcesFailed(failed));
        }
        Ok(definitions)
    }

    async fn fetch_with_retry(&self, source: &str) -> Result<Vec<ProxyDefinition>, FetchError> {
        let attempts = self.config.retries.max(1);
        let mut attempt = 0;

        loop {
            match self.fetch_source(source).await {
                Ok(definitions) => return Ok(definitions),
                Err(e) if attempt + 1 < attempts => {
                    debug!("Attempt {} for {} failed: {}", attempt + 1, source, e);
                    attempt += 1;
                    tokio::time::sleep(Duration::from_secs(u64::from(attempt))).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fetch and decode one source
    pub async fn fetch_source(&self, source: &str) -> Result<Vec<ProxyDefinition>, FetchError> {
        let content = if source.starts_with("http://") || source.starts_with("https://") {
            let response = self.client.get(source).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    url: source.to_string(),
                    status: status.as_u16(),
                });
            }
            response.text().await?
        } else {
            tokio::fs::read_to_string(source)
                .await
                .map_err(|e| FetchError::Io {
                    path: source.to_string(),
                    source: e,
                })?
        };

        ProxyParser::parse_subscription(&content, self.config.default_proxy_type).map_err(|e| {
            FetchError::Decode {
                source_name: source.to_string(),
                reason: e.to_string(),
            }
        })
    }
}
