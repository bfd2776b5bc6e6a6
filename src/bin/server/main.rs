//! RedisTimeSeries remote storage adapter
//!
//! Serves the Prometheus remote-storage endpoints and forwards them to
//! RedisTimeSeries.
//!
//! # Endpoints
//!
//! - `POST /write` - Remote write
//! - `POST /read` - Remote read
//! - `GET /health` - Backend health
//! - `GET /metrics` - Prometheus metrics
//!
//! # CLI Commands
//!
//! - `start` - Start the HTTP server (default if no command specified)
//! - `check-config` - Validate configuration and print a summary
//!
//! # Configuration
//!
//! Read from the `--config` file or `REDIS_TS_ADAPTER_CONFIG`, then
//! environment variables, then flags. The Redis password is only taken from
//! `REDIS_AUTH`.

mod config;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use config::{load_config, Overrides};
use redis_ts_adapter::bridge::Bridge;
use redis_ts_adapter::config::AdapterConfig;
use redis_ts_adapter::observer::PrometheusObserver;
use redis_ts_adapter::redis::{sanitize_url, RedisTimeSeries};
use redis_ts_adapter::server::{build_router, AppState};
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

// =============================================================================
// CLI Definition
// =============================================================================

/// Prometheus remote storage adapter for RedisTimeSeries
#[derive(Parser)]
#[command(name = "redis-ts-adapter")]
#[command(version)]
#[command(about = "Prometheus remote storage adapter for RedisTimeSeries", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    Start,

    /// Validate configuration without starting the server
    CheckConfig,
}

// =============================================================================
// Setup
// =============================================================================

/// Install the tracing subscriber
///
/// `RUST_LOG` wins over the configured level. An unusable level falls back
/// to `info` with a warning once logging is up.
fn init_tracing(level: &str) {
    let (filter, rejected) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, None),
        Err(_) => match EnvFilter::try_new(level) {
            Ok(filter) => (filter, None),
            Err(e) => (EnvFilter::new("info"), Some(e)),
        },
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    if let Some(e) = rejected {
        warn!(log_level = level, error = %e, "Invalid log level, falling back to info");
    }
}

/// Connect the configured backends and build the bridge
async fn build_bridge(
    config: &AdapterConfig,
    observer: Arc<PrometheusObserver>,
) -> Result<Bridge, Box<dyn std::error::Error>> {
    let mut builder = Bridge::builder().observer(observer);

    if let Some(redis_config) = config.redis.to_redis_config()? {
        info!(target_addr = %redis_config.target, "Connecting to RedisTimeSeries");
        let backend = RedisTimeSeries::connect(redis_config).await?;
        builder = builder.backend(Arc::new(backend));
    }

    Ok(builder.build())
}

/// Graceful shutdown signal handler
///
/// Registration failures are logged and that signal source is ignored.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {},
            Err(e) => {
                warn!(
                    error = %e,
                    "Ctrl+C handler installation failed - graceful shutdown unavailable"
                );
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                warn!(
                    error = %e,
                    "SIGTERM handler installation failed - SIGTERM shutdown unavailable"
                );
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

// =============================================================================
// CLI Command Handlers
// =============================================================================

/// Validate configuration and print summary
fn cmd_check_config(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&cli.overrides)?;
    config.validate()?;

    println!("Configuration is valid!");
    println!();
    println!("Server Settings:");
    println!("  Listen address: {}", config.server.listen_addr);
    println!("  Log level: {}", config.server.log_level);
    println!("  Request timeout: {}s", config.server.remote_timeout_secs);
    println!();
    println!("Redis Settings:");
    match config.redis.to_redis_config()? {
        Some(redis) => {
            println!("  Target: {}", redis.target);
            println!("  URL: {}", sanitize_url(&redis.url()?));
            println!("  Password: {}", if redis.password.is_some() { "set" } else { "not set" });
            println!("  Pool size: {}", redis.pool_size);
            println!("  Write timeout: {:?}", redis.command_timeout);
            println!("  Retries: {}", redis.retry_policy.max_retries);
        },
        None => println!("  Not configured (the server will refuse to start)"),
    }

    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::CheckConfig) => return cmd_check_config(&cli),
        Some(Commands::Start) | None => {},
    }

    let config = load_config(&cli.overrides)?;
    init_tracing(&config.server.log_level);

    config.validate_for_start()?;

    info!("Starting redis-ts-adapter v{}", env!("CARGO_PKG_VERSION"));
    debug!(
        listen_addr = %config.server.listen_addr,
        remote_timeout_secs = config.server.remote_timeout_secs,
        "Configuration loaded"
    );

    let observer = Arc::new(PrometheusObserver::new()?);
    let bridge = build_bridge(&config, observer.clone()).await?;
    let state = Arc::new(AppState {
        bridge,
        metrics: Some(observer),
    });

    let app = build_router(state, config.server.remote_timeout());
    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr).await?;
    info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}
