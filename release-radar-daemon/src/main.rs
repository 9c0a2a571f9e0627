//! Release Radar Daemon
//!
//! Background service that polls the catalog for new releases on a daily
//! schedule and exposes a local control API.
//!
//! # Running
//!
//! ```bash
//! cargo run -p release-radar-daemon
//! # or after install, with an explicit config file:
//! RELEASE_RADAR_CONFIG=/etc/release-radar.toml release-radard
//! ```

use anyhow::{Context, Result};
use release_radar_core::{RadarConfig, RadarContext};
use release_radar_daemon::{ApiState, DailySchedule, load_config, run_scheduler, start_server};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    init_logging(&config.daemon.log_level);

    info!("Starting Release Radar daemon...");
    info!("Loaded configuration from {:?}", config.config_path);

    run_daemon(config).await
}

fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt().with_env_filter(filter).with_target(false).init();
}

async fn run_daemon(config: RadarConfig) -> Result<()> {
    let schedule =
        DailySchedule::from_config(&config.schedule).context("Invalid schedule configuration")?;
    let run_on_start = config.schedule.run_on_start;
    let socket_path = config.daemon.socket_path.clone();

    let context = RadarContext::from_config(config)
        .await
        .context("Failed to initialize sync pipeline")?;

    info!("Daemon starting on {:?}", socket_path);
    let server_handle = start_server(&socket_path, ApiState::from_context(&context)).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let scheduler = tokio::spawn(run_scheduler(
        context.sync.clone(),
        schedule,
        run_on_start,
        shutdown_rx,
    ));

    info!("Daemon running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping...");

    let _ = shutdown_tx.send(true);
    scheduler.await.context("Scheduler task panicked")?;

    server_handle.stop().await?;

    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
        info!("Socket file removed");
    }

    info!("Daemon stopped");
    Ok(())
}
