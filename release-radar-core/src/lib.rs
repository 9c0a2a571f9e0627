//! # Release Radar Core
//!
//! Core library for polling a music catalog for new releases.
//!
//! This crate provides:
//! - A token manager holding independent service and user credentials
//! - A catalog client that follows cursor pagination
//! - An incremental sync pipeline that records unseen releases, appends them
//!   to a playlist and renders a digest
//! - File, keyring and in-memory credential storage
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use release_radar_core::{RadarConfig, RadarContext};
//!
//! async fn run_once() -> Result<(), release_radar_core::RadarError> {
//!     let config = RadarConfig::load(None)?;
//!     let context = RadarContext::from_config(config).await?;
//!     let report = context.sync.run().await?;
//!     println!("{} new releases", report.new_releases.len());
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod context;
pub mod digest;
pub mod error;
pub mod model;
pub mod oauth;
pub mod release_store;
pub mod store;
pub mod sync;
pub mod token;
pub mod token_manager;
pub mod watchlist;

// Re-export commonly used types at crate root
pub use model::{
    AlbumType,
    ArtistRef,
    ArtistWatchEntry,
    Release,
    StoredRelease,
    TokenScope,
};

pub use store::{
    CredentialBackend,
    FileStore,
    MemoryStore,
    Secret,
    SecretStore,
    StoreError,
    create_store,
};

#[cfg(feature = "keyring-store")]
pub use store::KeyringStore;

pub use token::{
    SlotStatus,
    Token,
    TokenError,
    TokenManager,
};

pub use token_manager::DefaultTokenManager;

pub use oauth::{OAuthSettings, authorization_url};

pub use catalog::{
    CatalogApi,
    CatalogClient,
    CatalogError,
    Paginated,
};

pub use release_store::{
    JsonReleaseStore,
    MemoryReleaseStore,
    ReleaseStore,
    ReleaseStoreError,
};

pub use sync::{
    RunReport,
    RunWarning,
    SyncError,
    SyncPipeline,
    SyncService,
    SyncStrategy,
};

pub use digest::{DigestRenderer, MarkdownDigest};

pub use watchlist::{WatchListEntry, extract_artists, load_watch_list, write_watch_list};

pub use config::RadarConfig;

pub use context::RadarContext;

pub use error::RadarError;
