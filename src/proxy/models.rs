//! Proxy data models

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Proxy type enumeration for the protocols that can be dialed natively
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    #[default]
    Http,
    Https,
    Socks5,
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyType::Http => write!(f, "http"),
            ProxyType::Https => write!(f, "https"),
            ProxyType::Socks5 => write!(f, "socks5"),
        }
    }
}

impl FromStr for ProxyType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(ProxyType::Http),
            "https" => Ok(ProxyType::Https),
            "socks5" | "socks" => Ok(ProxyType::Socks5),
            other => Err(anyhow::anyhow!("unsupported proxy type: {}", other)),
        }
    }
}

/// One candidate relay as decoded from a subscription.
///
/// The record is open-ended: only `server`, `port`, `name` and `type` are
/// interpreted here, every other field is carried through untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProxyDefinition(Map<String, Value>);

impl ProxyDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, builder style
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Server address, if present and non-empty
    pub fn server(&self) -> Option<&str> {
        self.str_field("server")
    }

    /// Port as an integer. Numeric strings are accepted as well.
    pub fn port(&self) -> Option<u16> {
        match self.0.get("port")? {
            Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.0.insert("name".to_string(), Value::String(name.into()));
    }

    /// Protocol type as written in the subscription (e.g. `socks5`, `vmess`)
    pub fn proxy_type(&self) -> Option<&str> {
        self.str_field("type")
    }

    /// `server:port` identity used for deduplication
    pub fn dedup_key(&self) -> Option<String> {
        let server = self.server()?;
        Some(format!("{}:{}", server, self.port().unwrap_or(0)))
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

impl From<Map<String, Value>> for ProxyDefinition {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl fmt::Display for ProxyDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.name(), self.dedup_key()) {
            (Some(name), _) => write!(f, "{}", name),
            (None, Some(key)) => write!(f, "{}", key),
            (None, None) => write!(f, "<unaddressable>"),
        }
    }
}

/// Proxy authentication credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

impl ProxyAuth {
    pub fn new(username: String, password: String) -> Self {
        Self { username, password }
    }
}

/// A relay that reqwest can dial directly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proxy {
    pub host: String,
    pub port: u16,
    pub proxy_type: ProxyType,
    pub auth: Option<ProxyAuth>,
}

impl Proxy {
    /// Create a new proxy without authentication
    pub fn new(host: String, port: u16, proxy_type: ProxyType) -> Self {
        Self {
            host,
            port,
            proxy_type,
            auth: None,
        }
    }

    /// Create a new proxy with authentication
    pub fn with_auth(
        host: String,
        port: u16,
        proxy_type: ProxyType,
        username: String,
        password: String,
    ) -> Self {
        Self {
            host,
            port,
            proxy_type,
            auth: Some(ProxyAuth::new(username, password)),
        }
    }

    /// Derive a dialable endpoint from a definition.
    ///
    /// Returns `None` for definitions without an address or with a protocol
    /// type outside of http/https/socks5.
    pub fn from_definition(definition: &ProxyDefinition) -> Option<Self> {
        let proxy_type = definition.proxy_type()?.parse().ok()?;
        let host = definition.server()?.to_string();
        let port = definition.port().filter(|p| *p != 0)?;

        let field = |key: &str| {
            definition
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        match (field("username"), field("password")) {
            (Some(user), Some(pass)) => Some(Self::with_auth(host, port, proxy_type, user, pass)),
            _ => Some(Self::new(host, port, proxy_type)),
        }
    }

    /// Convert back into a subscription record
    pub fn to_definition(&self, name: Option<&str>) -> ProxyDefinition {
        let mut definition = ProxyDefinition::new()
            .with("type", self.proxy_type.to_string())
            .with("server", self.host.clone())
            .with("port", self.port);
        if let Some(auth) = &self.auth {
            definition.insert("username", auth.username.clone());
            definition.insert("password", auth.password.clone());
        }
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            definition.set_name(name);
        }
        definition
    }

    /// Get the proxy string in IP:PORT format
    pub fn to_simple_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Platforms that can be probed through a proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Cloudflare,
    Google,
    Openai,
    Youtube,
    Netflix,
    Disney,
}

impl Platform {
    /// Gating probes, in the order they run. Failing either drops the proxy.
    pub const GATES: [Platform; 2] = [Platform::Cloudflare, Platform::Google];

    pub fn is_gate(&self) -> bool {
        Self::GATES.contains(self)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Cloudflare => "cloudflare",
            Platform::Google => "google",
            Platform::Openai => "openai",
            Platform::Youtube => "youtube",
            Platform::Netflix => "netflix",
            Platform::Disney => "disney",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cloudflare" => Ok(Platform::Cloudflare),
            "google" => Ok(Platform::Google),
            "openai" => Ok(Platform::Openai),
            "youtube" => Ok(Platform::Youtube),
            "netflix" => Ok(Platform::Netflix),
            "disney" => Ok(Platform::Disney),
            other => Err(anyhow::anyhow!("unknown platform: {}", other)),
        }
    }
}

/// A proxy that passed every gate, plus the outcome of each probe that ran.
///
/// Platforms that were not probed stay `false`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckResult {
    pub proxy: ProxyDefinition,
    pub cloudflare: bool,
    pub google: bool,
    pub openai: bool,
    pub youtube: bool,
    pub netflix: bool,
    pub disney: bool,
    /// Measured download rate in KB/s, when a speed test ran
    pub speed_kbps: Option<u64>,
}

impl CheckResult {
    pub fn new(proxy: ProxyDefinition) -> Self {
        Self {
            proxy,
            ..Default::default()
        }
    }

    pub fn record(&mut self, platform: Platform, passed: bool) {
        match platform {
            Platform::Cloudflare => self.cloudflare = passed,
            Platform::Google => self.google = passed,
            Platform::Openai => self.openai = passed,
            Platform::Youtube => self.youtube = passed,
            Platform::Netflix => self.netflix = passed,
            Platform::Disney => self.disney = passed,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.proxy.name()
    }
}
