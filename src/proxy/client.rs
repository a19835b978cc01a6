//! reqwest clients dialing through http/https/socks5 proxies

use crate::proxy::backend::ProxyClient;
use crate::proxy::models::{Proxy, ProxyType};
use crate::Result;
use anyhow::{anyhow, Context};
use reqwest::{Client, Proxy as ReqwestProxy, Url};
use std::time::Duration;

/// Browser-like user agent; several probe endpoints reject unknown agents
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// HTTP client bound to a single proxy
pub struct HttpProxyClient {
    client: Option<Client>,
    endpoint: String,
}

impl HttpProxyClient {
    /// Create a reqwest client routing every request through `proxy`
    pub fn connect(proxy: &Proxy, timeout: Duration) -> Result<Self> {
        let url = proxy_url(proxy)?;
        let reqwest_proxy = ReqwestProxy::all(url)
            .with_context(|| format!("invalid proxy {}", proxy.to_simple_string()))?;

        let client = Client::builder()
            .proxy(reqwest_proxy)
            .timeout(timeout)
            .connect_timeout(timeout)
            .pool_max_idle_per_host(0)
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;

        Ok(Self {
            client: Some(client),
            endpoint: proxy.to_simple_string(),
        })
    }

    /// The underlying client. Fails once the client has been closed.
    pub fn inner(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| anyhow!("client for {} already closed", self.endpoint))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ProxyClient for HttpProxyClient {
    fn close(&mut self) {
        // Dropping the client tears down its connection pool.
        self.client = None;
    }
}

/// Build the proxy URL with percent-encoded credentials
fn proxy_url(proxy: &Proxy) -> Result<Url> {
    let scheme = match proxy.proxy_type {
        ProxyType::Http => "http",
        ProxyType::Https => "https",
        ProxyType::Socks5 => "socks5h",
    };
    let host = if proxy.host.contains(':') && !proxy.host.starts_with('[') {
        format!("[{}]", proxy.host)
    } else {
        proxy.host.clone()
    };

    let mut url = Url::parse(&format!("{}://{}:{}", scheme, host, proxy.port))
        .with_context(|| format!("invalid proxy address {}", proxy.to_simple_string()))?;

    if let Some(auth) = &proxy.auth {
        url.set_username(&auth.username)
            .map_err(|_| anyhow!("cannot set proxy username"))?;
        url.set_password(Some(&auth.password))
            .map_err(|_| anyhow!("cannot set proxy password"))?;
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_url_plain() {
        let proxy = Proxy::new("127.0.0.1".to_string(), 8080, ProxyType::Http);
        assert_eq!(proxy_url(&proxy).unwrap().as_str(), "http://127.0.0.1:8080/");
    }

    #[test]
    fn test_proxy_url_socks_resolves_remotely() {
        let proxy = Proxy::new("proxy.example".to_string(), 1080, ProxyType::Socks5);
        assert_eq!(proxy_url(&proxy).unwrap().scheme(), "socks5h");
    }

    #[test]
    fn test_proxy_url_escapes_credentials() {
        let proxy = Proxy::with_auth(
            "10.0.0.1".to_string(),
            3128,
            ProxyType::Http,
            "user".to_string(),
            "p@ss:word".to_string(),
        );
        let url = proxy_url(&proxy).unwrap();
        assert_eq!(url.username(), "user");
        assert_eq!(url.password(), Some("p%40ss%3Aword"));
        assert_eq!(url.host_str(), Some("10.0.0.1"));
    }

    #[test]
    fn test_proxy_url_ipv6() {
        let proxy = Proxy::new("::1".to_string(), 8080, ProxyType::Http);
        assert_eq!(proxy_url(&proxy).unwrap().host_str(), Some("[::1]"));
    }

    #[test]
    fn test_close_is_idempotent() {
        let proxy = Proxy::new("127.0.0.1".to_string(), 8080, ProxyType::Http);
        let mut client = HttpProxyClient::connect(&proxy, Duration::from_secs(1)).unwrap();
        assert!(client.inner().is_ok());
        client.close();
        client.close();
        assert!(client.inner().is_err());
        assert_eq!(client.endpoint(), "127.0.0.1:8080");
    }
}
