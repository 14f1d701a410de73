/*
[INPUT]:  CLI arguments, YAML configuration file, OS shutdown signals
[OUTPUT]: Running market monitor with periodic summaries and graceful shutdown
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use tradedeck_monitor::{FeedSet, MarketMonitor, MonitorConfig};
use tradedeck_stream::ws::build_session_url;

#[derive(Parser, Debug)]
#[command(name = "tradedeck-monitor", version, about = "Live Binance market monitor")]
struct Cli {
    #[arg(long = "config", value_name = "PATH")]
    config_path: Option<PathBuf>,
    /// Overrides the configured symbol
    #[arg(long = "symbol", value_name = "SYMBOL")]
    symbol: Option<String>,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    #[arg(long = "dry-run")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut config = match &args.config_path {
        Some(path) => load_config(path)?,
        None => MonitorConfig::default(),
    };
    if let Some(symbol) = &args.symbol {
        config.symbol = symbol.clone();
        config.validate().context("validate config")?;
    }

    let _log_guard = init_tracing(&args.log_level, config.log_file.as_deref())?;

    info!(
        config_path = ?args.config_path,
        symbol = %config.symbol,
        dry_run = args.dry_run,
        "starting tradedeck-monitor"
    );

    let feeds = FeedSet::for_symbol(&config.symbol, config.depth_levels);
    let session_url = build_session_url(&config.stream.base_url, &feeds.streams())
        .context("build session url")?;
    info!(url = %session_url, "configuration loaded");

    if args.dry_run {
        info!("dry-run requested; configuration validated");
        return Ok(());
    }

    let monitor = MarketMonitor::from_config(&config);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    monitor.start().await.context("open market stream")?;
    info!("market monitor running");

    let period = Duration::from_secs(config.report_interval_secs);
    let mut report = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                info!(signal, "shutdown signal received");
                break;
            }
            _ = report.tick() => log_summary(&monitor),
        }
    }

    monitor.shutdown().await;
    info!("market monitor shutdown complete");

    Ok(())
}

fn log_summary(monitor: &MarketMonitor) {
    let snapshot = monitor.snapshot();
    let stats = monitor.client().stats();
    let change_percent = snapshot.ticker.as_ref().map(|ticker| ticker.change_percent);

    info!(
        symbol = %snapshot.symbol,
        connected = snapshot.connected,
        last_price = ?snapshot.last_price(),
        change_percent = ?change_percent,
        best_bid = ?snapshot.best_bid(),
        best_ask = ?snapshot.best_ask(),
        spread = ?snapshot.spread(),
        trades = snapshot.trades.len(),
        frames = stats.frames_received,
        dropped = stats.frames_dropped,
        reconnects = stats.reconnects,
        "market summary"
    );

    if stats.callback_failures > 0 {
        warn!(callback_failures = stats.callback_failures, "stream callbacks failed");
    }
}

fn init_tracing(log_level: &str, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;

    let Some(log_file) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|err| anyhow!(err))
            .context("initialize tracing subscriber")?;
        return Ok(None);
    };

    let directory = log_file
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = log_file
        .file_name()
        .context("log_file must name a file")?;
    std::fs::create_dir_all(directory)
        .with_context(|| format!("create log directory {}", directory.display()))?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;

    Ok(Some(guard))
}

fn load_config(path: &Path) -> Result<MonitorConfig> {
    let path_str = path
        .to_str()
        .context("config path must be valid utf-8")?;
    MonitorConfig::from_file(path_str).context("load config")
}

/// Resolves with the name of the first SIGINT or SIGTERM.
async fn shutdown_signal() -> &'static str {
    tokio::select! {
        name = interrupt() => name,
        name = terminate() => name,
    }
}

async fn interrupt() -> &'static str {
    match tokio::signal::ctrl_c().await {
        Ok(()) => "SIGINT",
        Err(err) => {
            warn!(error = %err, "SIGINT handler unavailable");
            std::future::pending().await
        }
    }
}

#[cfg(unix)]
async fn terminate() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
            "SIGTERM"
        }
        Err(err) => {
            warn!(error = %err, "SIGTERM handler unavailable");
            std::future::pending().await
        }
    }
}

#[cfg(not(unix))]
async fn terminate() -> &'static str {
    std::future::pending().await
}
