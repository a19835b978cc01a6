//! Subs Check - Subscription Proxy Checker
//!
//! Checks large, untrusted lists of proxy definitions for liveness and
//! quality with a bounded pool of concurrent workers, and emits the subset
//! that passes.

pub mod app;
pub mod error;
pub mod proxy;
pub mod tui;

pub use app::{App, AppConfig};
pub use error::FetchError;
pub use proxy::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
