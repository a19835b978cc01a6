//! Platform reachability probes and the download speed test

use crate::proxy::models::Platform;
use crate::Result;
use reqwest::{Client, StatusCode};
use std::time::Instant;

/// What a probe response must look like to count as reachable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// Exact status code
    Status(u16),
    /// Successful status and the body contains the marker
    Contains(&'static str),
    /// Successful status and the body does not contain the marker
    Absent(&'static str),
}

/// One platform probe: a single GET and a response expectation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSpec {
    pub url: &'static str,
    pub expect: Expect,
}

impl ProbeSpec {
    pub fn for_platform(platform: Platform) -> Self {
        let (url, expect) = match platform {
            Platform::Cloudflare => (
                "https://www.cloudflare.com/cdn-cgi/trace",
                Expect::Contains("loc="),
            ),
            Platform::Google => ("http://www.google.com/generate_204", Expect::Status(204)),
            Platform::Openai => (
                "https://api.openai.com/compliance/cookie_requirements",
                Expect::Absent("unsupported_country"),
            ),
            Platform::Youtube => (
                "https://www.youtube.com/premium",
                Expect::Absent("www.google.cn"),
            ),
            Platform::Netflix => ("https://www.netflix.com/title/81280792", Expect::Status(200)),
            Platform::Disney => (
                "https://www.disneyplus.com/",
                Expect::Absent("not available in your region"),
            ),
        };
        Self { url, expect }
    }

    /// Judge a response
    pub fn matches(&self, status: StatusCode, body: &str) -> bool {
        match self.expect {
            Expect::Status(code) => status.as_u16() == code,
            Expect::Contains(marker) => status.is_success() && body.contains(marker),
            Expect::Absent(marker) => status.is_success() && !body.contains(marker),
        }
    }
}

/// Run the probe for `platform` through `client`
pub async fn check_platform(client: &Client, platform: Platform) -> Result<bool> {
    let spec = ProbeSpec::for_platform(platform);
    let response = client.get(spec.url).send().await?;
    let status = response.status();

    let body = match spec.expect {
        Expect::Status(_) => String::new(),
        _ => response.text().await?,
    };

    Ok(spec.matches(status, &body))
}

/// Download `url` through `client` and return the rate in KB/s
pub async fn measure_speed(client: &Client, url: &str) -> Result<u64> {
    let start = Instant::now();
    let mut response = client.get(url).send().await?.error_for_status()?;

    let mut downloaded: u64 = 0;
    while let Some(chunk) = response.chunk().await? {
        downloaded += chunk.len() as u64;
    }

    Ok(kilobytes_per_second(downloaded, start.elapsed().as_secs_f64()))
}

/// Convert a transfer into KB/s
pub fn kilobytes_per_second(bytes: u64, seconds: f64) -> u64 {
    if seconds <= 0.0 {
        return 0;
    }
    (bytes as f64 / 1024.0 / seconds) as u64
}

/// Human readable rate used in display names
pub fn format_speed(kbps: u64) -> String {
    if kbps < 1024 {
        format!("{}KB/s", kbps)
    } else {
        format!("{:.1}MB/s", kbps as f64 / 1024.0)
    }
}
