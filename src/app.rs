//! One checking run end to end, and the periodic loop around it

use crate::proxy::backend::{CheckBackend, HttpBackend};
use crate::proxy::checker::{CheckerConfig, ProxyChecker};
use crate::proxy::dedup::deduplicate;
use crate::proxy::filter::filter_results;
use crate::proxy::models::{CheckResult, ProxyDefinition};
use crate::proxy::save::LocalSaver;
use crate::proxy::subscription::{FetcherConfig, SubscriptionFetcher};
use crate::Result;
use anyhow::Context;
use chrono::{DateTime, Local};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Default output directory for result files
const DEFAULT_OUTPUT_DIR: &str = "output";

/// Run-level configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Subscription URLs or local files
    pub sub_urls: Vec<String>,
    /// Re-check last run's passing proxies alongside fresh ones
    pub keep_success_proxies: bool,
    /// Name patterns; results must match one of them when non-empty
    pub filters: Vec<String>,
    /// Directory receiving the result files
    pub output_dir: String,
    /// Minutes between runs; 0 runs once
    pub check_interval: u64,
    #[serde(flatten)]
    pub checker: CheckerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sub_urls: Vec::new(),
            keep_success_proxies: false,
            filters: Vec::new(),
            output_dir: DEFAULT_OUTPUT_DIR.to_string(),
            check_interval: 0,
            checker: CheckerConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config file; `.yaml`/`.yml` are read as YAML, anything else as JSON
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
            _ => Ok(serde_json::from_str(&content)?),
        }
    }
}

/// Fetch, check, filter and save, keeping state between periodic runs
pub struct App<B: CheckBackend = HttpBackend> {
    config: AppConfig,
    checker: ProxyChecker<B>,
    fetcher: SubscriptionFetcher,
    saver: LocalSaver,
    kept: Vec<ProxyDefinition>,
}

impl App<HttpBackend> {
    pub fn new(config: AppConfig) -> Result<Self> {
        let checker = ProxyChecker::with_config(config.checker.clone());
        Self::with_checker(config, checker)
    }
}

impl<B: CheckBackend> App<B> {
    pub fn with_checker(config: AppConfig, checker: ProxyChecker<B>) -> Result<Self> {
        let fetcher = SubscriptionFetcher::with_config(
            FetcherConfig::new().with_retries(config.checker.retries),
        )?;
        let saver = LocalSaver::new(&config.output_dir);

        Ok(Self {
            config,
            checker,
            fetcher,
            saver,
            kept: Vec::new(),
        })
    }

    pub fn checker(&self) -> &ProxyChecker<B> {
        &self.checker
    }

    /// Fetch the sources and build the deduplicated batch to check
    pub async fn prepare(&mut self) -> Result<Vec<ProxyDefinition>> {
        let mut proxies = self.fetcher.fetch_all(&self.config.sub_urls).await?;
        info!("Fetched proxies: {}", proxies.len());

        // Appended after the fresh ones; dedup keeps the last write, so these win ties.
        let kept = std::mem::take(&mut self.kept);
        if self.config.keep_success_proxies && !kept.is_empty() {
            info!("Adding {} proxies that passed last run", kept.len());
            proxies.extend(kept);
        }

        let proxies = deduplicate(proxies);
        info!("Proxies after dedup: {}", proxies.len());
        Ok(proxies)
    }

    /// Remember, filter and save the results of a run
    pub fn finish(&mut self, results: Vec<CheckResult>) -> Result<Vec<CheckResult>> {
        if self.config.keep_success_proxies {
            self.kept = results.iter().map(|r| r.proxy.clone()).collect();
        }

        let results = filter_results(results, &self.config.filters);
        if results.is_empty() {
            info!("No available proxies");
        }
        self.saver.save_results(&results)?;
        Ok(results)
    }

    /// One complete run
    pub async fn check_once(&mut self) -> Result<Vec<CheckResult>> {
        info!("Starting proxy check");
        let proxies = self.prepare().await?;
        let results = self.checker.check_all(proxies).await?;
        let results = self.finish(results)?;
        info!("Check complete, {} proxies available", results.len());
        Ok(results)
    }

    /// Run once, or forever every `check_interval` minutes
    pub async fn run(&mut self) -> Result<()> {
        loop {
            self.check_once().await?;

            if self.config.check_interval == 0 {
                return Ok(());
            }

            let interval = check_interval(self.config.check_interval);
            match next_check_time(interval) {
                Some(next) => info!("Next check at {}", next.format("%Y-%m-%d %H:%M:%S")),
                None => info!("Next check in {} minutes", self.config.check_interval),
            }
            tokio::time::sleep(interval).await;
        }
    }
}

/// Interval between runs, saturating for absurdly large minute counts
fn check_interval(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}

/// Wall-clock time of the next run, if it is representable
fn next_check_time(interval: Duration) -> Option<DateTime<Local>> {
    let interval = chrono::Duration::from_std(interval).ok()?;
    Local::now().checked_add_signed(interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::backend::ProxyClient;
    use crate::proxy::models::Platform;
    use crate::proxy::save::{PROXIES_FILE, PROXIES_YAML_FILE, RESULTS_FILE};
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct NoopClient;

    impl ProxyClient for NoopClient {
        fn close(&mut self) {}
    }

    /// Passes every proxy whose server is not `dead.example`
    struct PassBackend;

    #[async_trait]
    impl CheckBackend for PassBackend {
        type Client = NoopClient;

        fn build_client(&self, proxy: &ProxyDefinition) -> Option<NoopClient> {
            (proxy.server() != Some("dead.example")).then_some(NoopClient)
        }

        async fn probe(&self, _platform: Platform, _client: &NoopClient) -> Result<bool> {
            Ok(true)
        }

        async fn measure_throughput(&self, _client: &NoopClient) -> Result<u64> {
            Ok(0)
        }

        async fn resolve_geo_label(
            &self,
            _client: &NoopClient,
            _proxy: &ProxyDefinition,
        ) -> Option<String> {
            None
        }
    }

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("subs-check-app-{}-{}", std::process::id(), name))
    }

    fn app(config: AppConfig) -> App<PassBackend> {
        let checker = ProxyChecker::with_backend(config.checker.clone(), PassBackend);
        App::with_checker(config, checker).unwrap()
    }

    #[test]
    fn test_app_config_from_json() {
        let path = scratch("config.json");
        std::fs::write(
            &path,
            r#"{"sub_urls": ["https://example.com/sub"], "concurrency": 4, "check_interval": 30}"#,
        )
        .unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.sub_urls, vec!["https://example.com/sub"]);
        assert_eq!(config.check_interval, 30);
        assert_eq!(config.checker.concurrency, 4);
        assert_eq!(config.output_dir, DEFAULT_OUTPUT_DIR);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_app_config_from_yaml() {
        let path = scratch("config.yaml");
        std::fs::write(
            &path,
            "sub_urls:\n  - https://example.com/clash.yaml\ntimeout: 2000\nsub_urls_retry: 5\nplatforms: [netflix]\n",
        )
        .unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.sub_urls, vec!["https://example.com/clash.yaml"]);
        assert_eq!(config.checker.timeout, Duration::from_millis(2000));
        assert_eq!(config.checker.retries, 5);
        assert_eq!(config.checker.platforms, vec![Platform::Netflix]);
        assert_eq!(config.output_dir, DEFAULT_OUTPUT_DIR);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_check_interval_saturates() {
        assert_eq!(check_interval(30), Duration::from_secs(1800));
        assert_eq!(check_interval(u64::MAX), Duration::from_secs(u64::MAX));
        assert!(next_check_time(check_interval(u64::MAX)).is_none());
        assert!(next_check_time(check_interval(30)).is_some());
    }

    #[tokio::test]
    async fn test_check_once_saves_results() {
        let source = scratch("sub-save.json");
        let output = scratch("out-save");
        std::fs::write(
            &source,
            r#"[
                {"name": "a", "server": "1.1.1.1", "port": 443},
                {"name": "b", "server": "dead.example", "port": 443},
                {"name": "c", "server": "1.1.1.1", "port": 443}
            ]"#,
        )
        .unwrap();

        let mut config = AppConfig::new();
        config.sub_urls = vec![source.to_string_lossy().to_string()];
        config.output_dir = output.to_string_lossy().to_string();

        let mut app = app(config);
        let results = app.check_once().await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name(), Some("c"));
        assert!(output.join(PROXIES_FILE).exists());

        std::fs::remove_file(source).ok();
        std::fs::remove_dir_all(output).ok();
    }

    #[tokio::test]
    async fn test_empty_run_replaces_previous_output() {
        let source = scratch("sub-stale.json");
        let output = scratch("out-stale");
        std::fs::write(&source, r#"[{"name": "a", "server": "1.1.1.1", "port": 1}]"#).unwrap();

        let mut config = AppConfig::new();
        config.sub_urls = vec![source.to_string_lossy().to_string()];
        config.output_dir = output.to_string_lossy().to_string();

        let mut app = app(config);
        assert_eq!(app.check_once().await.unwrap().len(), 1);

        // Every proxy fails the second run.
        std::fs::write(&source, r#"[{"name": "a", "server": "dead.example", "port": 1}]"#)
            .unwrap();
        assert!(app.check_once().await.unwrap().is_empty());

        let saved: Vec<ProxyDefinition> =
            serde_json::from_slice(&std::fs::read(output.join(PROXIES_FILE)).unwrap()).unwrap();
        assert!(saved.is_empty());
        let results: Vec<CheckResult> =
            serde_json::from_slice(&std::fs::read(output.join(RESULTS_FILE)).unwrap()).unwrap();
        assert!(results.is_empty());
        let yaml = std::fs::read_to_string(output.join(PROXIES_YAML_FILE)).unwrap();
        assert_eq!(yaml.trim(), "proxies: []");

        std::fs::remove_file(source).ok();
        std::fs::remove_dir_all(output).ok();
    }

    #[tokio::test]
    async fn test_keep_success_proxies() {
        let source = scratch("sub-keep.json");
        let output = scratch("out-keep");
        std::fs::write(
            &source,
            r#"[{"name": "a", "server": "1.1.1.1", "port": 1}, {"name": "b", "server": "2.2.2.2", "port": 2}]"#,
        )
        .unwrap();

        let mut config = AppConfig::new();
        config.sub_urls = vec![source.to_string_lossy().to_string()];
        config.output_dir = output.to_string_lossy().to_string();
        config.keep_success_proxies = true;

        let mut app = app(config);
        assert_eq!(app.check_once().await.unwrap().len(), 2);

        // The source shrinks; last run's passing proxies come back and win the tie.
        std::fs::write(
            &source,
            r#"[{"name": "a-fresh", "server": "1.1.1.1", "port": 1}]"#,
        )
        .unwrap();
        let proxies = app.prepare().await.unwrap();
        let mut names: Vec<_> = proxies.iter().filter_map(|p| p.name()).collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);

        std::fs::remove_file(source).ok();
        std::fs::remove_dir_all(output).ok();
    }

    #[tokio::test]
    async fn test_filters_apply_after_check() {
        let source = scratch("sub-filter.txt");
        let output = scratch("out-filter");
        std::fs::write(&source, "http://1.1.1.1:80#keep-me\nhttp://2.2.2.2:80#drop-me\n").unwrap();

        let mut config = AppConfig::new();
        config.sub_urls = vec![source.to_string_lossy().to_string()];
        config.output_dir = output.to_string_lossy().to_string();
        config.filters = vec!["^keep".to_string()];

        let mut app = app(config);
        let results = app.check_once().await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name(), Some("keep-me"));

        std::fs::remove_file(source).ok();
        std::fs::remove_dir_all(output).ok();
    }

    #[tokio::test]
    async fn test_upstream_failure_aborts_run() {
        let mut config = AppConfig::new();
        config.sub_urls = vec!["/nonexistent/sub.json".to_string()];
        config.checker.retries = 1;

        let mut app = app(config);
        assert!(app.check_once().await.is_err());
    }
}
