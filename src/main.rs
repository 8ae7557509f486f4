//! Main entry point for the Rally Point matchmaking service
//!
//! This is the production entry point that initializes and runs the
//! complete matchmaking microservice with proper error handling,
//! logging, and graceful shutdown.

use anyhow::Result;
use clap::Parser;
use rally_point::config::AppConfig;
use rally_point::service::{AppState, HealthCheck, HealthStatus};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Rally Point Matchmaking Service - Dungeon and Raid Group Queueing
#[derive(Parser)]
#[command(
    name = "rally-point",
    version,
    about = "A matchmaking microservice for dungeon and raid group queueing",
    long_about = "Rally Point is a Rust-based matchmaking microservice that queues players \
                 and parties for instanced content, forms groups through a three-tier \
                 matching pass, and launches a game instance for each formed group."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Perform health check and exit
    #[arg(long, help = "Perform a health check and exit with status code")]
    health_check: bool,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// API port override
    #[arg(long, value_name = "PORT", help = "Override queue API port")]
    api_port: Option<u16>,

    /// Metrics port override
    #[arg(long, value_name = "PORT", help = "Override metrics server port")]
    metrics_port: Option<u16>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Perform health check and return appropriate exit code
async fn perform_health_check(config: AppConfig) -> Result<()> {
    info!("Performing health check...");

    let app_state = Arc::new(AppState::new(config)?);

    match HealthCheck::check(app_state).await {
        Ok(health) => {
            println!("Health Check: {}", health.status);
            println!("  Queue Depth: {}", health.stats.queue_depth);
            println!("  Passes Run: {}", health.stats.passes_run);
            println!("  Groups Formed: {}", health.stats.groups_formed);
            println!("  Players Matched: {}", health.stats.players_matched);

            if health.status == HealthStatus::Unhealthy {
                std::process::exit(1);
            }
            std::process::exit(0);
        }
        Err(e) => {
            error!("Health check failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
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
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("Rally Point Matchmaking Service");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   API port: {}", config.service.api_port);
    info!("   Metrics port: {}", config.service.metrics_port);
    info!(
        "   Entry TTL: {}s",
        config.matchmaking.entry_ttl_seconds
    );
    info!(
        "   Expiry sweep interval: {}s",
        config.matchmaking.sweep_interval_seconds
    );
}

/// Load and merge configuration from environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        info!("Loading configuration from: {}", config_path.display());
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    // Apply CLI overrides
    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(api_port) = args.api_port {
        config.service.api_port = api_port;
    }

    if let Some(metrics_port) = args.metrics_port {
        config.service.metrics_port = metrics_port;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration (CLI args can override environment/config file)
    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    // Initialize logging early (before any other operations)
    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    // Handle special modes
    if args.health_check {
        return perform_health_check(config).await;
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    display_startup_banner(&config);

    // Initialize application state
    info!("Initializing service components...");
    let app_state = match AppState::new(config.clone()) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    // Start the service
    info!("Starting service...");
    if let Err(e) = app_state.clone().start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    info!("Rally Point Matchmaking Service is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    // Wait for shutdown signal
    wait_for_shutdown_signal().await;

    // Begin graceful shutdown
    info!("Shutdown signal received, beginning graceful shutdown...");

    let shutdown_timeout = config.shutdown_timeout();
    match tokio::time::timeout(shutdown_timeout, app_state.shutdown()).await {
        Ok(Ok(())) => {
            info!("Graceful shutdown completed successfully");
        }
        Ok(Err(e)) => {
            warn!("Shutdown completed with errors: {}", e);
        }
        Err(_) => {
            warn!("Shutdown timeout exceeded, forcing exit");
        }
    }

    info!("Rally Point Matchmaking Service stopped");
    Ok(())
}
