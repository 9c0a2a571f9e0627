//! Configuration shared by the daemon and the CLI.
//!
//! Loaded from `config.toml` in the platform config directory (or an explicit
//! path). Every section and field has a default, so a missing file yields a
//! configuration that only lacks the client credentials. A few fields can be
//! overridden from the environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `RELEASE_RADAR_CLIENT_ID` | `catalog.client_id` |
//! | `RELEASE_RADAR_CLIENT_SECRET` | `catalog.client_secret` |
//! | `RELEASE_RADAR_PLAYLIST_ID` | `sync.playlist_id` |
//! | `RELEASE_RADAR_AUTH_CODE` | `catalog.authorization_code` |
//! | `RELEASE_RADAR_OUTPUT_DIR` | `sync.output_dir` |

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{FixedOffset, NaiveTime};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::oauth::OAuthSettings;
use crate::store::{CredentialBackend, Secret};
use crate::sync::SyncStrategy;

const ENV_CLIENT_ID: &str = "RELEASE_RADAR_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "RELEASE_RADAR_CLIENT_SECRET";
const ENV_PLAYLIST_ID: &str = "RELEASE_RADAR_PLAYLIST_ID";
const ENV_AUTH_CODE: &str = "RELEASE_RADAR_AUTH_CODE";
const ENV_OUTPUT_DIR: &str = "RELEASE_RADAR_OUTPUT_DIR";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarConfig {
    pub catalog: CatalogConfig,
    pub sync: SyncConfig,
    pub schedule: ScheduleConfig,
    pub daemon: DaemonConfig,

    /// Path of the file this configuration was loaded from.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

/// Largest accepted `catalog.expiry_buffer_secs`. A buffer longer than a
/// typical token lifetime would force a new grant on every request.
pub const MAX_EXPIRY_BUFFER_SECS: u32 = 3600;

/// Catalog API and OAuth client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub api_base_url: String,
    pub auth_url: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: Secret,
    pub redirect_uri: Option<String>,
    pub scopes: Vec<String>,
    pub request_timeout_secs: u64,
    pub expiry_buffer_secs: u32,

    /// One-time authorization code; only ever supplied through the environment.
    #[serde(skip)]
    pub authorization_code: Option<Secret>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.spotify.com/v1".to_string(),
            auth_url: "https://accounts.spotify.com/authorize".to_string(),
            token_url: "https://accounts.spotify.com/api/token".to_string(),
            client_id: String::new(),
            client_secret: Secret::new(""),
            redirect_uri: None,
            scopes: vec![
                "playlist-modify-public".to_string(),
                "playlist-modify-private".to_string(),
            ],
            request_timeout_secs: 30,
            expiry_buffer_secs: 30,
            authorization_code: None,
        }
    }
}

/// Sync pipeline settings and file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Watch list JSON file.
    pub watch_list_path: PathBuf,
    /// Playlist new releases are appended to; no append when unset.
    pub playlist_id: Option<String>,
    /// Pause between two artists' fetches.
    pub artist_delay_ms: u64,
    pub strategy: SyncStrategy,
    /// Directory of the release store and the file credential store.
    pub data_dir: PathBuf,
    /// Directory the digest is written to.
    pub output_dir: PathBuf,
    pub credential_backend: CredentialBackend,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let dirs = project_dirs();
        let data_dir = dirs
            .as_ref()
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".release-radar"));
        let watch_list_path = dirs
            .as_ref()
            .map(|d| d.config_dir().join("input.json"))
            .unwrap_or_else(|| PathBuf::from("input.json"));

        Self {
            watch_list_path,
            playlist_id: None,
            artist_delay_ms: 1000,
            strategy: SyncStrategy::default(),
            output_dir: data_dir.join("output"),
            data_dir,
            credential_backend: CredentialBackend::default(),
        }
    }
}

/// Daily trigger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Local time of the daily run, `HH:MM`.
    pub daily_at: String,
    /// UTC offset the daily time is expressed in, `+HH:MM` or `-HH:MM`.
    pub utc_offset: String,
    /// Run once right after the daemon starts.
    pub run_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_at: "07:00".to_string(),
            utc_offset: "+00:00".to_string(),
            run_on_start: true,
        }
    }
}

impl ScheduleConfig {
    pub fn daily_time(&self) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(&self.daily_at, "%H:%M").map_err(|e| ConfigError::Invalid {
            field: "schedule.daily_at",
            message: format!("'{}': {}", self.daily_at, e),
        })
    }

    pub fn offset(&self) -> Result<FixedOffset, ConfigError> {
        parse_utc_offset(&self.utc_offset).ok_or_else(|| ConfigError::Invalid {
            field: "schedule.utc_offset",
            message: format!("'{}' is not of the form +HH:MM", self.utc_offset),
        })
    }
}

fn parse_utc_offset(value: &str) -> Option<FixedOffset> {
    let (sign, rest) = match value.as_bytes().first()? {
        b'+' => (1, &value[1..]),
        b'-' => (-1, &value[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Daemon process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Path to the Unix socket of the control API.
    pub socket_path: PathBuf,

    /// Logging level used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            log_level: "info".to_string(),
        }
    }
}

/// Default control socket location: the runtime dir if there is one, else the
/// data dir.
pub fn default_socket_path() -> PathBuf {
    project_dirs()
        .map(|d| d.runtime_dir().unwrap_or(d.data_dir()).join("release-radar.sock"))
        .unwrap_or_else(|| PathBuf::from("/tmp/release-radar.sock"))
}

/// Default configuration file location.
pub fn default_config_path() -> PathBuf {
    project_dirs()
        .map(|d| d.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("release-radar.toml"))
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "release-radar", "release-radar")
}

impl RadarConfig {
    /// Load from `path`, or from [`default_config_path`] when `None`, then
    /// apply environment overrides.
    ///
    /// A missing file at the default location yields defaults; a missing
    /// explicit path is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config_path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_config_path(), false),
        };

        let mut config = if required || config_path.exists() {
            let contents = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
                path: config_path.clone(),
                source,
            })?;
            Self::from_toml_str(&contents)?
        } else {
            tracing::debug!("No config at {:?}, using defaults", config_path);
            Self::default()
        };

        config.config_path = Some(config_path);
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply overrides looked up through `lookup`. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get(ENV_CLIENT_ID) {
            self.catalog.client_id = v;
        }
        if let Some(v) = get(ENV_CLIENT_SECRET) {
            self.catalog.client_secret = Secret::new(v);
        }
        if let Some(v) = get(ENV_PLAYLIST_ID) {
            self.sync.playlist_id = Some(v);
        }
        if let Some(v) = get(ENV_AUTH_CODE) {
            self.catalog.authorization_code = Some(Secret::new(v));
        }
        if let Some(v) = get(ENV_OUTPUT_DIR) {
            self.sync.output_dir = PathBuf::from(v);
        }
    }

    /// Check the fields without which no run can succeed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.catalog.client_id.is_empty() {
            return Err(ConfigError::Invalid {
                field: "catalog.client_id",
                message: format!("not set (config file or {})", ENV_CLIENT_ID),
            });
        }
        if self.catalog.client_secret.expose().is_empty() {
            return Err(ConfigError::Invalid {
                field: "catalog.client_secret",
                message: format!("not set (config file or {})", ENV_CLIENT_SECRET),
            });
        }
        if self.catalog.expiry_buffer_secs > MAX_EXPIRY_BUFFER_SECS {
            return Err(ConfigError::Invalid {
                field: "catalog.expiry_buffer_secs",
                message: format!(
                    "{} exceeds the maximum of {} seconds",
                    self.catalog.expiry_buffer_secs, MAX_EXPIRY_BUFFER_SECS
                ),
            });
        }
        self.schedule.daily_time()?;
        self.schedule.offset()?;
        Ok(())
    }

    /// OAuth client settings derived from the `[catalog]` section.
    pub fn oauth_settings(&self) -> OAuthSettings {
        OAuthSettings {
            client_id: self.catalog.client_id.clone(),
            client_secret: self.catalog.client_secret.clone(),
            auth_url: self.catalog.auth_url.clone(),
            token_url: self.catalog.token_url.clone(),
            redirect_uri: self.catalog.redirect_uri.clone(),
            scopes: self.catalog.scopes.clone(),
        }
    }

    /// Location of the JSON release store.
    pub fn release_store_path(&self) -> PathBuf {
        self.sync.data_dir.join("releases.json")
    }
}
