//! tictac-parlor service binary
//!
//! Resolves configuration (file or environment, then command line), serves the
//! WebSocket gateway with its health and metrics routes, and drains live
//! sessions on SIGINT or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tictac_parlor::config::{validate_config, AppConfig};
use tictac_parlor::service::AppState;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "tictac-parlor", version)]
#[command(about = "Matchmaking and live sessions for two-player tic-tac-toe")]
struct Args {
    /// TOML configuration file; environment variables are used when omitted
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Port for the WebSocket, health and metrics server
    #[arg(long, value_name = "PORT")]
    http_port: Option<u16>,

    /// Seconds without a move before a session is abandoned
    #[arg(long, value_name = "SECONDS")]
    idle_timeout: Option<u64>,

    /// Fixed seed for symbol assignment
    #[arg(long)]
    seed: Option<u64>,

    /// Shorthand for --log-level debug
    #[arg(short, long)]
    debug: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    dry_run: bool,
}

impl Args {
    fn resolve_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_file(path)?,
            None => AppConfig::from_env()?,
        };

        if let Some(level) = &self.log_level {
            config.service.log_level = level.clone();
        }
        if self.debug {
            config.service.log_level = "debug".to_string();
        }
        if let Some(port) = self.http_port {
            config.service.http_port = port;
        }
        if let Some(timeout) = self.idle_timeout {
            config.session.idle_timeout_seconds = timeout;
        }
        if self.seed.is_some() {
            config.session.symbol_seed = self.seed;
        }

        validate_config(&config).context("Invalid configuration")?;
        Ok(config)
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_line_number(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

/// Resolves on SIGINT, or SIGTERM on unix
async fn shutdown_signal() {
    let interrupt = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

fn log_settings(config: &AppConfig) {
    info!("🎲 {} v{}", config.service.name, tictac_parlor::VERSION);
    info!(
        "   Listening on port {} (gateway at /ws, metrics at /metrics)",
        config.service.http_port
    );
    info!(
        "   Sessions: idle after {}s, reaped every {}s, symbol seed: {}",
        config.session.idle_timeout_seconds,
        config.session.reaper_interval_seconds,
        config
            .session
            .symbol_seed
            .map(|s| s.to_string())
            .unwrap_or_else(|| "random".to_string())
    );
    info!(
        "   Store writes: {} retries, backoff {}ms..{}ms",
        config.persistence.max_retries,
        config.persistence.retry_delay_ms,
        config.persistence.max_retry_delay_ms
    );
}

async fn run(config: AppConfig) -> Result<()> {
    let mut app = AppState::new(config.clone()).await?;
    app.start().await?;

    if let Some(addr) = app.http_addr() {
        info!("✅ Ready for players on {}", addr);
    }

    shutdown_signal().await;
    info!("🛑 Draining live sessions...");

    match tokio::time::timeout(config.shutdown_timeout(), app.shutdown()).await {
        Ok(Ok(())) => info!("Shutdown complete"),
        Ok(Err(e)) => warn!("Shutdown finished with errors: {}", e),
        Err(_) => warn!(
            "Shutdown did not finish within {:?}, exiting anyway",
            config.shutdown_timeout()
        ),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match args.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(2);
        }
    };

    if args.dry_run {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    init_logging(&config.service.log_level)?;
    if let Some(path) = &args.config {
        info!("Configuration loaded from {}", path.display());
    }
    log_settings(&config);

    run(config).await
}
