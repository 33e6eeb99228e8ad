//! # medx-server: Binary Entry Point
//!
//! Loads configuration, wires the application state, starts the retention
//! sweeper and serves the Axum router until Ctrl-C.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use medx_api::config::{AppConfig, LogFormat};
use medx_api::state::AppState;
use medx_store::RetentionSweeper;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "medx-server")]
#[command(about = "Advance directive engine: intake, emergency resolution and post-mortem execution")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "MEDX_CONFIG")]
    config: Option<PathBuf>,

    /// Listen port (overrides config file and PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    init_tracing(config.log_format);
    tracing::info!(?config, "configuration loaded");

    let metrics = PrometheusBuilder::new().install_recorder()?;
    let sweep_interval = config.sweep_interval();
    let port = config.port;
    let state = AppState::build(config)?.with_metrics(metrics);

    let sweeper = RetentionSweeper::new(state.store.clone(), sweep_interval)
        .with_blob_store(state.blobs.clone())
        .spawn();

    let app = medx_api::app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "medx-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutdown signal received");
        })
        .await?;

    sweeper.shutdown().await;
    tracing::info!("medx-server stopped");
    Ok(())
}
