//! Top-level error type for Release Radar.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::digest::DigestError;
use crate::release_store::ReleaseStoreError;
use crate::store::StoreError;
use crate::sync::SyncError;
use crate::token::TokenError;
use crate::watchlist::WatchListError;

/// Top-level error type encompassing all Release Radar errors.
#[derive(Debug, Error)]
pub enum RadarError {
    /// Error from credential storage operations.
    #[error("credential store error: {0}")]
    Store(#[from] StoreError),

    /// Error from token operations.
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("release store error: {0}")]
    ReleaseStore(#[from] ReleaseStoreError),

    #[error("digest error: {0}")]
    Digest(#[from] DigestError),

    #[error("watch list error: {0}")]
    WatchList(#[from] WatchListError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),
}
