//! QuoteAlert CLI
//!
//! Polls a stock quote and emails buy/sell alerts until interrupted.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use rust_decimal::Decimal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use quotealert::alerting::{AlertMonitor, NotificationSink, SmtpNotifier};
use quotealert::config::LogFormat;
use quotealert::models::{money, MonitorConfig};
use quotealert::quotes::{BrapiClient, BrapiConfig, PriceSource};
use quotealert::Config;

/// QuoteAlert - Stock price alerts by email
#[derive(Debug, Parser)]
#[command(name = "quotealert")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Ticker to monitor, e.g. PETR4
    #[arg(value_name = "STOCK_TICKER", value_parser = parse_ticker)]
    ticker: String,

    /// Send a sell alert when the price is at or above this value
    #[arg(value_name = "SELL_PRICE", value_parser = parse_price)]
    sell_price: Decimal,

    /// Send a buy alert when the price is at or below this value
    #[arg(value_name = "BUY_PRICE", value_parser = parse_price)]
    buy_price: Decimal,

    /// Configuration file path
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Polling interval, overriding the configured one (e.g. "30s", "5m")
    #[arg(short, long, value_parser = humantime::parse_duration)]
    interval: Option<Duration>,

    /// Quote API key, overriding the configured one
    #[arg(long, env = "BRAPI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_ticker(raw: &str) -> Result<String, String> {
    let ticker = raw.trim();
    if ticker.is_empty() {
        return Err("ticker must not be blank".to_string());
    }
    Ok(ticker.to_string())
}

fn parse_price(raw: &str) -> Result<Decimal, String> {
    let raw = raw.trim();
    raw.parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| format!("invalid price: {raw}"))
}

/// Load `.env` (from `env_file`, or searched upward from the working
/// directory) and then parse `args`, so `.env` values back `env` options.
fn parse_args<I, T>(env_file: Option<&Path>, args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    // A missing .env is not an error
    match env_file {
        Some(path) => dotenvy::from_path(path).ok(),
        None => dotenvy::dotenv().ok().map(|_| ()),
    };

    Cli::try_parse_from(args)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = parse_args(None, std::env::args_os()).unwrap_or_else(|e| e.exit());

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Run with --help for usage.");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config, cli.verbose);

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(config: &Config, verbose: bool) {
    let log_level = if verbose { "debug" } else { config.logging.level.as_str() };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    match config.logging.format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    let api_key = cli
        .api_key
        .or_else(|| config.provider.api_key.clone())
        .filter(|key| !key.trim().is_empty())
        .context("quote API key is missing; set provider.apiKey or BRAPI_API_KEY")?;

    let source: Arc<dyn PriceSource> = Arc::new(BrapiClient::new(BrapiConfig {
        api_key,
        base_url: config.provider.base_url.clone(),
        timeout: config.provider.request_timeout,
    })?);
    let sink: Arc<dyn NotificationSink> = Arc::new(SmtpNotifier::new(&config.email)?);

    let mut monitor_config = MonitorConfig::new(
        cli.ticker,
        cli.buy_price,
        cli.sell_price,
        cli.interval.unwrap_or(config.alerts.polling_interval),
    );
    monitor_config.notify_on_error = config.alerts.notify_on_error;

    println!("QuoteAlert {}", env!("CARGO_PKG_VERSION"));
    println!("   Ticker:   {}", monitor_config.ticker);
    println!("   Buy at:   <= {}", money(monitor_config.buy_price));
    println!("   Sell at:  >= {}", money(monitor_config.sell_price));
    println!(
        "   Interval: {}",
        humantime::format_duration(monitor_config.polling_interval)
    );
    println!("   Provider: {}", config.provider.base_url);
    println!("   Config:   {}", cli.config.display());
    println!();

    let monitor = AlertMonitor::new(monitor_config, source, sink);
    monitor.start()?;

    println!("Press Ctrl+C to stop...");

    shutdown_signal().await;
    info!("Shutting down...");

    monitor.stop();
    monitor.wait().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
