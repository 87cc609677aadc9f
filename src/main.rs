//! Insights Operator Binary Entry Point
//!
//! Runs the gather scheduler and the status server until SIGINT or SIGTERM.
//! Core functionality is provided by the `insights_operator` library crate.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use insights_operator::{
    archive::DiskRecorder,
    collector::{CollectorSet, FileCollector, OperatorInfoCollector},
    config::{AppConfig, DirectorySource},
    scheduler::Scheduler,
    server::{AppState, create_router},
    uploader::Uploader,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Insights Operator - periodic cluster data gathering and upload
#[derive(Parser, Debug)]
#[command(name = "insights-operator", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "INSIGHTS_CONFIG"
    )]
    config: String,

    /// Support bundle directory (overrides config file)
    #[arg(long, env = "INSIGHTS_SUPPORT_PATH")]
    support_path: Option<String>,

    /// Status server port (overrides config file)
    #[arg(long, env = "INSIGHTS_SERVER_PORT")]
    server_port: Option<u16>,

    /// Archive storage directory (overrides config file)
    #[arg(long, env = "INSIGHTS_STORAGE_PATH")]
    storage_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,insights_operator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Insights Operator {}", env!("CARGO_PKG_VERSION"));

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration from file
    tracing::info!("Loading configuration from: {}", cli.config);
    let mut config = AppConfig::load_or_default(&cli.config)?;

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(path) = cli.support_path {
        config.support.path = path;
    }
    if let Some(port) = cli.server_port {
        config.server.port = port;
    }
    if let Some(path) = cli.storage_path {
        config.storage.path = path;
    }
    config.validate()?;

    tracing::info!(
        "Server: {}:{}, Support: {}, Storage: {} (retain {})",
        config.server.bind,
        config.server.port,
        config.support.path,
        config.storage.path,
        config.storage.retain,
    );

    // Build collectors
    let mut collectors = CollectorSet::new(config.gather.collector_timeout);
    collectors.register(OperatorInfoCollector::new());
    for collector in &config.collectors {
        tracing::info!(
            "Registered collector: {} ({} -> {})",
            collector.name,
            collector.path.display(),
            collector.prefix
        );
        collectors.register(FileCollector::new(collector.clone()));
    }

    let scheduler = Scheduler::new(
        Arc::new(DirectorySource::new(&config.support.path)),
        collectors,
        Uploader::new(config.gather.upload_timeout)?,
    )
    .with_limits(config.gather.limits())
    .with_recorder(DiskRecorder::new(&config.storage.path, config.storage.retain))
    .with_config_poll(config.gather.config_poll);

    let app = create_router(AppState {
        status: scheduler.status(),
    });

    // Start the gather loop
    let cancel = CancellationToken::new();
    let worker = tokio::spawn(scheduler.run(cancel.clone()));

    // Parse bind address
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;

    tracing::info!("Status server listening on: http://{}", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;

    tracing::info!("Waiting for the current gather cycle to finish...");
    if let Err(e) = worker.await {
        tracing::error!("Gather scheduler task failed: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM, then stop the gather loop.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }

    tracing::info!("Stopping gather scheduler...");
    cancel.cancel();
}
