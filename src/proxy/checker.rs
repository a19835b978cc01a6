//! Concurrent checking pipeline
//!
//! A distributor feeds every definition into a bounded task channel, a fixed
//! pool of workers drains it and runs the per-item check, and a collector
//! gathers passing results from the result channel. The result channel
//! closes once the last worker has exited.

use crate::proxy::backend::{CheckBackend, ClientGuard, HttpBackend};
use crate::proxy::models::{CheckResult, Platform, ProxyDefinition};
use crate::proxy::namer::{Namer, UNRESOLVED_LABEL};
use crate::proxy::platform::format_speed;
use crate::proxy::progress::{Progress, ProgressReporter, DEFAULT_REPORT_INTERVAL};
use crate::Result;
use anyhow::{anyhow, bail};
use futures::future::join_all;
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

/// Default timeout for each request through a proxy, in milliseconds
const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Default number of concurrent checks
const DEFAULT_CONCURRENCY: usize = 20;

/// Default minimum download rate in KB/s
const DEFAULT_MIN_SPEED: u64 = 1024;

/// Default number of attempts for geo lookups
const DEFAULT_RETRIES: u32 = 3;

/// Delay before stopping the reporter so its last frame shows completion
const FINAL_FRAME_DELAY: Duration = Duration::from_millis(100);

/// Configuration for proxy checker
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// Timeout for each request made through a proxy
    #[serde(rename = "timeout", deserialize_with = "millis")]
    pub timeout: Duration,
    /// Number of concurrent checks
    pub concurrency: usize,
    /// Download used for the throughput gate; `None` disables it
    pub speed_test_url: Option<String>,
    /// Minimum download rate in KB/s when the throughput gate is on
    pub min_speed: u64,
    /// Rename passing proxies after their egress location
    pub rename_node: bool,
    /// Draw a progress line on stderr while checking
    pub print_progress: bool,
    /// Pass every proxy without probing it
    pub skip_checks: bool,
    /// Extra platforms to probe; they never disqualify a proxy
    pub platforms: Vec<Platform>,
    /// Attempts for subscription fetches and geo lookups
    #[serde(alias = "sub_urls_retry")]
    pub retries: u32,
    /// Path to MMDB file used when the trace lookup fails (optional)
    pub mmdb_path: Option<String>,
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            concurrency: DEFAULT_CONCURRENCY,
            speed_test_url: None,
            min_speed: DEFAULT_MIN_SPEED,
            rename_node: false,
            print_progress: false,
            skip_checks: false,
            platforms: Vec::new(),
            retries: DEFAULT_RETRIES,
            mmdb_path: None,
        }
    }
}

impl CheckerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_speed_test(mut self, url: String, min_speed: u64) -> Self {
        self.speed_test_url = Some(url);
        self.min_speed = min_speed;
        self
    }

    pub fn with_rename(mut self, rename: bool) -> Self {
        self.rename_node = rename;
        self
    }

    pub fn with_progress(mut self, print_progress: bool) -> Self {
        self.print_progress = print_progress;
        self
    }

    pub fn with_skip_checks(mut self, skip: bool) -> Self {
        self.skip_checks = skip;
        self
    }

    pub fn with_platforms(mut self, platforms: Vec<Platform>) -> Self {
        self.platforms = platforms;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Non-gating platforms to probe, without duplicates
    fn extra_platforms(&self) -> Vec<Platform> {
        let mut extra: Vec<Platform> = Vec::new();
        for platform in &self.platforms {
            if !platform.is_gate() && !extra.contains(platform) {
                extra.push(*platform);
            }
        }
        extra
    }
}

/// Checks batches of proxy definitions with a bounded worker pool
pub struct ProxyChecker<B: CheckBackend = HttpBackend> {
    config: Arc<CheckerConfig>,
    backend: Arc<B>,
    namer: Arc<Namer>,
}

impl ProxyChecker<HttpBackend> {
    /// Create a new proxy checker with default configuration
    pub fn new() -> Self {
        Self::with_config(CheckerConfig::default())
    }

    /// Create a new proxy checker with custom configuration
    pub fn with_config(config: CheckerConfig) -> Self {
        let backend = HttpBackend::from_config(&config);
        Self::with_backend(config, backend)
    }
}

impl<B: CheckBackend> ProxyChecker<B> {
    pub fn with_backend(config: CheckerConfig, backend: B) -> Self {
        Self {
            config: Arc::new(config),
            backend: Arc::new(backend),
            namer: Arc::new(Namer::new()),
        }
    }

    /// Worker count for a batch: never more workers than proxies
    pub fn thread_count(&self, proxy_count: usize) -> usize {
        self.config.concurrency.max(1).min(proxy_count)
    }

    /// Check every definition and return the ones that passed
    pub async fn check_all(&self, proxies: Vec<ProxyDefinition>) -> Result<Vec<CheckResult>> {
        let progress = Arc::new(Progress::new(proxies.len()));
        self.run(proxies, progress).await
    }

    /// Like [`ProxyChecker::check_all`], reporting into caller-owned counters.
    ///
    /// `progress` must have been created for exactly `proxies.len()` items.
    /// Result order is arrival order, not input order.
    pub async fn run(
        &self,
        proxies: Vec<ProxyDefinition>,
        progress: Arc<Progress>,
    ) -> Result<Vec<CheckResult>> {
        if progress.total() != proxies.len() {
            bail!(
                "progress sized for {} proxies, got {}",
                progress.total(),
                proxies.len()
            );
        }

        self.namer.reset();

        let proxy_count = proxies.len();
        if proxy_count == 0 {
            info!("No proxies to check");
            return Ok(Vec::new());
        }

        let thread_count = self.thread_count(proxy_count);
        info!("Checking {} proxies with {} workers", proxy_count, thread_count);

        let reporter = self
            .config
            .print_progress
            .then(|| ProgressReporter::spawn(Arc::clone(&progress), DEFAULT_REPORT_INTERVAL));

        let (task_tx, task_rx) = mpsc::channel::<ProxyDefinition>(proxy_count);
        let task_rx = Arc::new(Mutex::new(task_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<CheckResult>(1);

        let workers: Vec<_> = (0..thread_count)
            .map(|_| {
                let checker = self.clone();
                let tasks = Arc::clone(&task_rx);
                let results = result_tx.clone();
                let progress = Arc::clone(&progress);
                tokio::spawn(async move { checker.worker(tasks, results, progress).await })
            })
            .collect();
        // Workers now own every sender; the result channel closes when the last one exits.
        drop(result_tx);

        let distributor = tokio::spawn(async move {
            for proxy in proxies {
                if task_tx.send(proxy).await.is_err() {
                    break;
                }
            }
        });
        debug!("Distributing {} tasks", proxy_count);

        let collector = tokio::spawn(async move {
            let mut results = Vec::new();
            while let Some(result) = result_rx.recv().await {
                results.push(result);
            }
            results
        });

        for joined in join_all(workers).await {
            join_outcome(joined)?;
        }
        join_outcome(distributor.await)?;
        let results = join_outcome(collector.await)?;

        if let Some(reporter) = reporter {
            tokio::time::sleep(FINAL_FRAME_DELAY).await;
            reporter.stop().await;
        }

        info!("Available proxies: {}", results.len());
        Ok(results)
    }

    async fn worker(
        &self,
        tasks: Arc<Mutex<mpsc::Receiver<ProxyDefinition>>>,
        results: mpsc::Sender<CheckResult>,
        progress: Arc<Progress>,
    ) {
        loop {
            let next = tasks.lock().await.recv().await;
            let Some(proxy) = next else {
                break;
            };

            let outcome = self.check_proxy(proxy).await;

            progress.record_checked();
            if let Some(result) = outcome {
                progress.record_available();
                if results.send(result).await.is_err() {
                    warn!("Result collector stopped before workers finished");
                }
            }
        }
    }

    /// Run every check stage for one definition.
    ///
    /// Returns `None` when the proxy is dropped: no client, a failed gate,
    /// or a failed or too slow speed test.
    pub async fn check_proxy(&self, mut proxy: ProxyDefinition) -> Option<CheckResult> {
        if self.config.skip_checks {
            return Some(CheckResult::new(proxy));
        }

        let mut result = CheckResult::default();
        let speed = {
            let Some(client) = self.backend.build_client(&proxy) else {
                debug!("Failed to create client for {}", proxy);
                return None;
            };
            let guard = ClientGuard::new(client);

            for platform in Platform::GATES {
                match self.backend.probe(platform, guard.client()).await {
                    Ok(true) => result.record(platform, true),
                    Ok(false) => {
                        debug!("{} probe failed for {}", platform, proxy);
                        return None;
                    }
                    Err(e) => {
                        debug!("{} probe error for {}: {}", platform, proxy, e);
                        return None;
                    }
                }
            }

            let speed = if self.config.speed_test_url.is_some() {
                match self.backend.measure_throughput(guard.client()).await {
                    Ok(kbps) if kbps >= self.config.min_speed => Some(kbps),
                    Ok(kbps) => {
                        debug!("{} too slow: {}KB/s", proxy, kbps);
                        return None;
                    }
                    Err(e) => {
                        debug!("Speed test failed for {}: {}", proxy, e);
                        return None;
                    }
                }
            } else {
                None
            };

            for platform in self.config.extra_platforms() {
                let reachable = self
                    .backend
                    .probe(platform, guard.client())
                    .await
                    .unwrap_or(false);
                result.record(platform, reachable);
            }

            speed
        };

        self.update_name(&mut proxy, speed).await;

        result.proxy = proxy;
        result.speed_kbps = speed;
        Some(result)
    }

    async fn update_name(&self, proxy: &mut ProxyDefinition, speed: Option<u64>) {
        if self.config.rename_node {
            // Some protocols misbehave after a speed test, so look up the
            // location with a fresh client.
            let Some(client) = self.backend.build_client(proxy) else {
                debug!("Failed to create rename client for {}", proxy);
                return;
            };
            let guard = ClientGuard::new(client);

            let label = self
                .backend
                .resolve_geo_label(guard.client(), proxy)
                .await
                .unwrap_or_else(|| UNRESOLVED_LABEL.to_string());
            proxy.set_name(self.namer.rename(&label));
        }

        if let Some(kbps) = speed {
            let base = proxy.name().unwrap_or_default().trim().to_string();
            proxy.set_name(format!("{} | ⬇️ {}", base, format_speed(kbps)));
        }
    }
}

impl<B: CheckBackend> Clone for ProxyChecker<B> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            backend: Arc::clone(&self.backend),
            namer: Arc::clone(&self.namer),
        }
    }
}

impl Default for ProxyChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// A panicking task is a bug in the pipeline; re-raise it here.
fn join_outcome<T>(joined: std::result::Result<T, JoinError>) -> Result<T> {
    match joined {
        Ok(value) => Ok(value),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(anyhow!("checking task cancelled: {}", e)),
    }
}
