//! Errors that abort a run before any proxy is checked

use thiserror::Error;

/// Failure to obtain the definitions to check
#[derive(Debug, Error)]
pub enum FetchError {
    /// No subscription sources configured
    #[error("no subscription sources configured")]
    NoSources,

    /// Every configured source failed
    #[error("all {0} subscription sources failed")]
    AllSourcesFailed(usize),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Reading a local subscription file failed
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The payload could not be decoded
    #[error("failed to decode {source_name}: {reason}")]
    Decode { source_name: String, reason: String },
}
