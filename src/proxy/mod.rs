//! Proxy module for checking subscription proxies
//!
//! This module provides functionality for:
//! - Fetching and decoding subscription sources
//! - Deduplicating definitions and giving them unique names
//! - Checking proxies with a bounded concurrent worker pool
//! - Renaming passing proxies after their egress location
//! - Filtering and saving the passing set

pub mod backend;
pub mod checker;
pub mod client;
pub mod dedup;
pub mod filter;
pub mod geo;
pub mod models;
pub mod namer;
pub mod parser;
pub mod platform;
pub mod progress;
pub mod save;
pub mod subscription;

pub use backend::{CheckBackend, ClientGuard, HttpBackend, ProxyClient};
pub use checker::{CheckerConfig, ProxyChecker};
pub use dedup::deduplicate;
pub use models::{CheckResult, Platform, Proxy, ProxyAuth, ProxyDefinition, ProxyType};
pub use namer::Namer;
pub use parser::ProxyParser;
pub use progress::{Progress, ProgressReporter, ProgressSnapshot};
pub use save::LocalSaver;
pub use subscription::{FetcherConfig, SubscriptionFetcher};
