use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use subs_check::{
    proxy::{deduplicate, Platform, Progress, ProxyParser, ProxyType},
    tui::Dashboard,
    App, AppConfig,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Env var that turns every check into a pass-through
const SKIP_ENV: &str = "SUB_CHECK_SKIP";

/// Checks subscription proxies with a bounded pool of concurrent workers
#[derive(Parser)]
#[command(name = "subs-check")]
#[command(about = "Checks subscription proxies with a bounded pool of concurrent workers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log at debug level regardless of LOG_LEVEL
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch subscriptions, check every proxy and save the passing ones
    Check {
        /// JSON or YAML config file; flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Subscription URL or local file (can specify multiple)
        #[arg(short, long)]
        sub: Vec<String>,
        /// Number of concurrent workers
        #[arg(short = 'n', long)]
        concurrency: Option<usize>,
        /// Per-request timeout in milliseconds
        #[arg(long)]
        timeout: Option<u64>,
        /// URL downloaded to measure throughput
        #[arg(long)]
        speed_test_url: Option<String>,
        /// Minimum throughput in KB/s when a speed test URL is set
        #[arg(long)]
        min_speed: Option<u64>,
        /// Rename passing proxies after their egress location
        #[arg(long)]
        rename: bool,
        /// Draw a progress bar on stderr
        #[arg(long)]
        progress: bool,
        /// Pass every proxy without probing it
        #[arg(long)]
        skip: bool,
        /// Re-check last run's passing proxies on the next run
        #[arg(long)]
        keep_success: bool,
        /// Minutes between runs; 0 runs once
        #[arg(short, long)]
        interval: Option<u64>,
        /// Output directory for result files
        #[arg(short, long)]
        output: Option<String>,
        /// Keep only results whose name matches (can specify multiple)
        #[arg(short, long)]
        filter: Vec<String>,
        /// GeoLite2 country database used when the trace lookup fails
        #[arg(long)]
        mmdb: Option<String>,
        /// Extra platform to probe: openai, youtube, netflix, disney
        #[arg(short, long)]
        platform: Vec<String>,
        /// Show the interactive dashboard (runs once)
        #[arg(long)]
        tui: bool,
    },
    /// Deduplicate a subscription file and print the result
    Dedup {
        /// Input subscription file
        input: PathBuf,
        /// Type for bare host:port lines (http, https, socks5)
        #[arg(short = 't', long, default_value = "http")]
        proxy_type: String,
        /// Print only the assigned names
        #[arg(long)]
        names: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let tui = matches!(cli.command, Commands::Check { tui: true, .. });
    init_tracing(cli.verbose, tui);

    if let Err(e) = run(cli.command).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// LOG_LEVEL picks the filter; the dashboard owns the screen so it only gets errors.
fn init_tracing(verbose: bool, tui: bool) {
    let level = if tui {
        "error".to_string()
    } else if verbose {
        "debug".to_string()
    } else {
        std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
    };

    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Check {
            config,
            sub,
            concurrency,
            timeout,
            speed_test_url,
            min_speed,
            rename,
            progress,
            skip,
            keep_success,
            interval,
            output,
            filter,
            mmdb,
            platform,
            tui,
        } => {
            let mut config = match config {
                Some(path) => AppConfig::from_file(&path)?,
                None => AppConfig::new(),
            };

            if !sub.is_empty() {
                config.sub_urls = sub;
            }
            if !filter.is_empty() {
                config.filters = filter;
            }
            if let Some(output) = output {
                config.output_dir = output;
            }
            if let Some(interval) = interval {
                config.check_interval = interval;
            }
            config.keep_success_proxies |= keep_success;

            let checker = &mut config.checker;
            if let Some(concurrency) = concurrency {
                checker.concurrency = concurrency;
            }
            if let Some(timeout) = timeout {
                checker.timeout = Duration::from_millis(timeout);
            }
            if let Some(url) = speed_test_url {
                checker.speed_test_url = Some(url);
            }
            if let Some(min_speed) = min_speed {
                checker.min_speed = min_speed;
            }
            if let Some(mmdb) = mmdb {
                checker.mmdb_path = Some(mmdb);
            }
            if !platform.is_empty() {
                checker.platforms = platform
                    .iter()
                    .map(|p| p.parse::<Platform>())
                    .collect::<Result<_>>()?;
            }
            checker.rename_node |= rename;
            checker.print_progress |= progress && !tui;
            checker.skip_checks |= skip || skip_from_env();
            if checker.skip_checks {
                info!("Checks skipped, every proxy passes unchecked");
            }

            let mut app = App::new(config)?;
            if tui {
                run_dashboard(&mut app).await
            } else {
                app.run().await
            }
        }
        Commands::Dedup {
            input,
            proxy_type,
            names,
        } => {
            let ptype: ProxyType = proxy_type.parse()?;
            let content = std::fs::read_to_string(&input)?;
            let proxies = deduplicate(ProxyParser::parse_subscription(&content, ptype)?);

            info!("{} unique proxies in {:?}", proxies.len(), input);
            if names {
                for proxy in &proxies {
                    println!("{}", proxy.name().unwrap_or_default());
                }
            } else {
                println!("{}", serde_json::to_string_pretty(&proxies)?);
            }
            Ok(())
        }
    }
}

async fn run_dashboard(app: &mut App) -> Result<()> {
    let proxies = app.prepare().await?;
    let progress = Arc::new(Progress::new(proxies.len()));

    let mut dashboard = Dashboard::new(progress);
    match dashboard.run(app.checker(), proxies).await? {
        Some(results) => {
            let results = app.finish(results)?;
            println!("{} proxies available", results.len());
        }
        None => println!("Check cancelled, nothing saved"),
    }
    Ok(())
}

fn skip_from_env() -> bool {
    std::env::var(SKIP_ENV)
        .map(|v| !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false"))
        .unwrap_or(false)
}
