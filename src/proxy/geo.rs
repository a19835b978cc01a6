//! Geo-label resolution for renaming passing proxies

use crate::Result;
use maxminddb::{geoip2, Reader};
use reqwest::Client;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Trace endpoint reporting the caller's egress location as `loc=XX`
pub const TRACE_URL: &str = "https://www.cloudflare.com/cdn-cgi/trace";

/// Extract the `loc=` value from a trace response body
pub fn parse_trace_location(body: &str) -> Option<String> {
    body.lines()
        .find_map(|line| line.trim().strip_prefix("loc="))
        .map(str::trim)
        .filter(|loc| !loc.is_empty())
        .map(str::to_string)
}

/// Ask the trace endpoint, through the proxy, where the egress address is.
///
/// Tries `attempts` times, sleeping `attempt` seconds after each failure.
pub async fn resolve_via_trace(client: &Client, attempts: u32) -> Option<String> {
    for attempt in 0..attempts {
        match fetch_trace(client).await {
            Ok(Some(loc)) => return Some(loc),
            Ok(None) => debug!("Trace response without location"),
            Err(e) => debug!("Failed to fetch proxy location: {}", e),
        }
        tokio::time::sleep(Duration::from_secs(u64::from(attempt))).await;
    }
    None
}

async fn fetch_trace(client: &Client) -> Result<Option<String>> {
    let body = client.get(TRACE_URL).send().await?.text().await?;
    Ok(parse_trace_location(&body))
}

/// Country lookups against a local MMDB database
pub struct GeoLocator {
    reader: Reader<Vec<u8>>,
}

impl GeoLocator {
    /// Create a new GeoLocator from an MMDB file path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = Reader::open_readfile(path)?;
        Ok(Self { reader })
    }

    /// ISO 3166-1 alpha-2 country code of an address
    pub fn country_code(&self, ip: IpAddr) -> Result<Option<String>> {
        let lookup_result = self.reader.lookup(ip)?;
        let city: Option<geoip2::City> = lookup_result.decode()?;

        Ok(city.and_then(|city| city.country.iso_code.map(String::from)))
    }

    /// Resolve `host` (IP literal or hostname) and look up its country
    pub async fn lookup_host(&self, host: &str, port: u16) -> Option<String> {
        let ip = match host.parse::<IpAddr>() {
            Ok(ip) => ip,
            Err(_) => tokio::net::lookup_host((host, port))
                .await
                .ok()?
                .next()?
                .ip(),
        };

        match self.country_code(ip) {
            Ok(code) => code,
            Err(e) => {
                debug!("MMDB lookup failed for {}: {}", ip, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trace_location() {
        let body = "fl=12f\nh=www.cloudflare.com\nip=203.0.113.7\nloc=JP\ntls=TLSv1.3\n";
        assert_eq!(parse_trace_location(body), Some("JP".to_string()));
    }

    #[test]
    fn test_parse_trace_location_missing() {
        assert_eq!(parse_trace_location("ip=1.1.1.1\n"), None);
        assert_eq!(parse_trace_location("loc=\n"), None);
        assert_eq!(parse_trace_location(""), None);
    }

    #[test]
    fn test_missing_mmdb_file() {
        assert!(GeoLocator::from_path("/nonexistent/GeoLite2-City.mmdb").is_err());
    }
}
