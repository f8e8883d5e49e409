//! Magus Daemon
//!
//! Long-running service that keeps the email dataset fresh and logs
//! backlog and throughput figures on every refresh.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use magus_core::aggregate::{bucket_by_period, latest_bucket_start, Period};
use magus_core::api::{ApiClient, FullDataset, MagusApi};
use magus_core::cache::EmailCache;
use magus_core::config::Config;
use magus_core::models::UiStatus;

/// Buckets included in each refresh summary
const SUMMARY_BUCKETS: usize = 3;

#[derive(Parser)]
#[command(name = "magus-daemon")]
#[command(about = "Magus dataset refresh daemon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon (default if no command specified)
    Run,
    /// Refresh once, log the summary and exit
    Once,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging depends on the config, so a bad config is reported on stderr only
    let config = Config::load().with_context(|| {
        format!("Failed to load config from {}", Config::default_path().display())
    })?;
    init_logging(&config)?;

    match cli.command {
        Some(Commands::Run) | None => run_daemon(config).await,
        Some(Commands::Once) => run_once(config).await,
    }
}

/// Log to stderr and to a daily rolling file in `general.log_dir`
fn init_logging(config: &Config) -> Result<()> {
    std::fs::create_dir_all(&config.general.log_dir)?;
    let file_appender =
        RollingFileAppender::new(Rotation::DAILY, &config.general.log_dir, "daemon.log");

    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level))
    };

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string()))
        .with_ansi(false)
        .with_target(false);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    tracing_subscriber::registry()
        .with(file_layer.with_filter(filter()))
        .with(stderr_layer.with_filter(filter()))
        .init();
    Ok(())
}

fn build_cache(config: &Config) -> Result<Arc<EmailCache>> {
    let api: Arc<dyn MagusApi> = Arc::new(ApiClient::new(&config.api)?);
    Ok(Arc::new(EmailCache::new(api, &config.inbox)))
}

async fn run_once(config: Config) -> Result<()> {
    let tz = config.timezone()?;
    let cache = build_cache(&config)?;
    let dataset = cache.refresh().await?;
    log_summary(&dataset, tz);
    Ok(())
}

async fn run_daemon(config: Config) -> Result<()> {
    info!("Starting Magus daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("API: {}", config.api.base_url);

    let tz = config.timezone()?;
    let cache = build_cache(&config)?;
    let interval = Duration::from_secs(config.inbox.refresh_interval_secs);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(
        "Daemon is running, refreshing every {}s. Press Ctrl+C to stop.",
        interval.as_secs()
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match cache.refresh().await {
                    Ok(dataset) => log_summary(&dataset, tz),
                    Err(e) => {
                        error!("Refresh failed: {}", e);
                        if let Some(hint) = e.action_hint() {
                            warn!("{}", hint);
                        }
                    }
                }
            }
            result = signal::ctrl_c() => {
                result?;
                break;
            }
        }
    }

    info!("Shutting down daemon...");
    Ok(())
}

fn log_summary(dataset: &FullDataset, tz: Tz) {
    let needs_review = dataset
        .records
        .iter()
        .filter(|r| UiStatus::from_backend(&r.status) == UiStatus::NeedsReview)
        .count();

    info!(
        "Dataset: {} emails ({} on server), {} need review{}",
        dataset.scanned(),
        dataset.total,
        needs_review,
        if dataset.reached_max_rows { ", row cap reached" } else { "" }
    );

    if let Some(start) = latest_bucket_start(&dataset.records, Period::Hour, tz) {
        info!("Latest activity in hour starting {}", start.format("%Y-%m-%d %H:%M %Z"));
    }

    let buckets = bucket_by_period(&dataset.records, Period::Hour, tz);
    let skip = buckets.len().saturating_sub(SUMMARY_BUCKETS);
    for b in buckets.iter().skip(skip) {
        info!(
            "  {} total={} reviewed={} processed={}",
            b.label, b.total, b.reviewed, b.processed
        );
    }
}
