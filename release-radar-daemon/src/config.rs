//! Daemon configuration bootstrap.

use anyhow::{Context, Result};
use release_radar_core::RadarConfig;
use std::path::PathBuf;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "RELEASE_RADAR_CONFIG";

/// Load configuration from `RELEASE_RADAR_CONFIG` or the default location,
/// validate it and create the data and output directories.
pub fn load_config() -> Result<RadarConfig> {
    let explicit = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);

    let config = RadarConfig::load(explicit.as_deref()).context("Failed to load configuration")?;
    prepare(&config)?;
    Ok(config)
}

/// Validate a loaded configuration and create the directories it names.
pub fn prepare(config: &RadarConfig) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    std::fs::create_dir_all(&config.sync.data_dir)
        .with_context(|| format!("Failed to create data directory {:?}", config.sync.data_dir))?;
    std::fs::create_dir_all(&config.sync.output_dir).with_context(|| {
        format!("Failed to create output directory {:?}", config.sync.output_dir)
    })?;

    Ok(())
}
