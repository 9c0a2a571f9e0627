//! Persistence for long-lived credentials.
//!
//! Only the user-scope refresh token outlives the process; it is stored under
//! [`USER_REFRESH_TOKEN_KEY`]. Access tokens and the service-scope refresh
//! token stay in memory.
//!
//! Backends: [`FileStore`] (default), [`MemoryStore`] and, with the
//! `keyring-store` feature, [`KeyringStore`]. [`create_store`] picks one from
//! configuration.
//!
//! ```rust,ignore
//! use release_radar_core::store::{MemoryStore, Secret, SecretStore, USER_REFRESH_TOKEN_KEY};
//!
//! let store = MemoryStore::new();
//! store.set(USER_REFRESH_TOKEN_KEY, &Secret::new("refresh")).await?;
//! assert!(store.exists(USER_REFRESH_TOKEN_KEY).await?);
//! ```

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod file;
mod memory;
#[cfg(feature = "keyring-store")]
mod keyring;

pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "keyring-store")]
pub use keyring::KeyringStore;

/// Storage key of the persisted user refresh credential.
pub const USER_REFRESH_TOKEN_KEY: &str = "release-radar/user/refresh_token";

/// A token, code or client secret. Formats as `[REDACTED]`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value, for request bodies and headers only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Error type for credential store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend error: {message}")]
    BackendError { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The platform keyring could not be reached.
    #[error("keyring not available: {message}")]
    KeyringUnavailable { message: String },
}

/// Key-value storage for [`Secret`]s.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError>;

    /// Insert or overwrite.
    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError>;

    /// Remove a key; removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }
}

#[async_trait]
impl<S: SecretStore + ?Sized> SecretStore for Box<S> {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError> {
        (**self).set(key, secret).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        (**self).list_keys(prefix).await
    }
}

/// Which backend holds the persisted user refresh credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialBackend {
    /// JSON file in the data directory.
    #[default]
    File,
    /// OS keyring, falling back to the file backend when unavailable.
    Keyring,
    /// Process memory only. The user must re-authorize after every restart.
    Memory,
}

/// Create a credential store for the configured backend.
///
/// `data_dir` is where the file backend keeps `credentials.json`; it is also
/// the fallback location when the keyring cannot be reached.
pub fn create_store(
    backend: CredentialBackend,
    data_dir: &Path,
) -> Result<Box<dyn SecretStore>, StoreError> {
    let file_path = data_dir.join("credentials.json");

    match backend {
        CredentialBackend::File => {
            tracing::debug!("Using file credential storage at {:?}", file_path);
            Ok(Box::new(FileStore::load_from_path(file_path)?))
        }
        CredentialBackend::Keyring => {
            #[cfg(feature = "keyring-store")]
            match KeyringStore::try_new("release-radar") {
                Ok(store) => {
                    tracing::info!("Using OS keyring for credential storage");
                    return Ok(Box::new(store));
                }
                Err(e) => {
                    tracing::warn!(
                        "Keyring unavailable ({}), falling back to file store at {:?}",
                        e,
                        file_path
                    );
                }
            }

            #[cfg(not(feature = "keyring-store"))]
            tracing::warn!(
                "Keyring storage requested but keyring-store feature not enabled. \
                 Using file store at {:?}",
                file_path
            );

            Ok(Box::new(FileStore::load_from_path(file_path)?))
        }
        CredentialBackend::Memory => {
            tracing::warn!(
                "Using in-memory credential storage. \
                 The user refresh token will not persist across restarts."
            );
            Ok(Box::new(MemoryStore::new()))
        }
    }
}
