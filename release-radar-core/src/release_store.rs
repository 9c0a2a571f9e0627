//! Durable record of releases already seen.
//!
//! The store is append-only: rows are never updated or pruned. The sync
//! pipeline relies on one more property of its contents, stated here because
//! the store cannot enforce it: every release of a watched artist that is newer
//! than the newest recorded one is absent, so a walk over candidates sorted by
//! date descending may stop at the first recorded id.
//!
//! # Storage Location
//!
//! [`JsonReleaseStore`] keeps its rows in `releases.json` under the configured
//! data directory.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;
use thiserror::Error;

use crate::model::{Release, StoredRelease};

/// Error type for release store operations.
#[derive(Debug, Error)]
pub enum ReleaseStoreError {
    /// The release failed validation at the store boundary.
    #[error("invalid release {id}: {message}")]
    Invalid { id: String, message: String },

    /// I/O error reading or writing the store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal lock poisoning error.
    #[error("internal lock error: {message}")]
    LockError { message: String },
}

/// Persistence interface of the sync pipeline.
#[async_trait]
pub trait ReleaseStore: Send + Sync {
    /// Whether a release with this id has been recorded.
    async fn exists(&self, id: &str) -> Result<bool, ReleaseStoreError>;

    /// Record a release.
    ///
    /// Returns `Ok(false)` without touching the store if the id is already
    /// recorded.
    async fn insert(&self, release: &Release) -> Result<bool, ReleaseStoreError>;

    /// Number of recorded releases.
    async fn count(&self) -> Result<usize, ReleaseStoreError>;

    /// All recorded releases, oldest recording first.
    async fn list(&self) -> Result<Vec<StoredRelease>, ReleaseStoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReleaseStoreData {
    /// Version of the store format (for future migrations).
    version: u32,
    releases: Vec<StoredRelease>,
}

impl Default for ReleaseStoreData {
    fn default() -> Self {
        Self {
            version: 1,
            releases: Vec::new(),
        }
    }
}

struct Inner {
    data: ReleaseStoreData,
    ids: HashSet<String>,
}

impl Inner {
    fn new(data: ReleaseStoreData) -> Self {
        let ids = data.releases.iter().map(|r| r.release.id.clone()).collect();
        Self { data, ids }
    }

    fn insert(&mut self, release: &Release) -> Result<bool, ReleaseStoreError> {
        release
            .validate()
            .map_err(|message| ReleaseStoreError::Invalid {
                id: release.id.clone(),
                message,
            })?;

        if !self.ids.insert(release.id.clone()) {
            return Ok(false);
        }

        self.data.releases.push(StoredRelease {
            release: release.clone(),
            recorded_at: Utc::now(),
        });
        Ok(true)
    }
}

fn lock_error<E: std::fmt::Display>(e: E) -> ReleaseStoreError {
    ReleaseStoreError::LockError {
        message: format!("lock poisoned: {}", e),
    }
}

/// Release store persisted as a JSON document.
///
/// The whole document is rewritten on every insert; the in-memory id index
/// answers existence checks.
pub struct JsonReleaseStore {
    path: PathBuf,
    inner: RwLock<Inner>,
}

impl JsonReleaseStore {
    /// Load the store from a specific path.
    ///
    /// Creates parent directories if they don't exist; a missing file is an
    /// empty store.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ReleaseStoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            ReleaseStoreData::default()
        };

        tracing::debug!(
            "Loaded {} recorded releases from {:?}",
            data.releases.len(),
            path
        );

        Ok(Self {
            path,
            inner: RwLock::new(Inner::new(data)),
        })
    }

    fn save(&self, data: &ReleaseStoreData) -> Result<(), ReleaseStoreError> {
        let contents = serde_json::to_string_pretty(data)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl ReleaseStore for JsonReleaseStore {
    async fn exists(&self, id: &str) -> Result<bool, ReleaseStoreError> {
        let inner = self.inner.read().map_err(lock_error)?;
        Ok(inner.ids.contains(id))
    }

    async fn insert(&self, release: &Release) -> Result<bool, ReleaseStoreError> {
        let mut inner = self.inner.write().map_err(lock_error)?;
        if !inner.insert(release)? {
            return Ok(false);
        }

        if let Err(e) = self.save(&inner.data) {
            // Keep memory and disk in agreement so a retry can succeed.
            inner.data.releases.pop();
            inner.ids.remove(&release.id);
            return Err(e);
        }
        Ok(true)
    }

    async fn count(&self) -> Result<usize, ReleaseStoreError> {
        Ok(self.inner.read().map_err(lock_error)?.data.releases.len())
    }

    async fn list(&self) -> Result<Vec<StoredRelease>, ReleaseStoreError> {
        Ok(self.inner.read().map_err(lock_error)?.data.releases.clone())
    }
}

/// In-memory release store for tests and dry runs.
pub struct MemoryReleaseStore {
    inner: RwLock<Inner>,
}

impl MemoryReleaseStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::new(ReleaseStoreData::default())),
        }
    }
}

impl Default for MemoryReleaseStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReleaseStore for MemoryReleaseStore {
    async fn exists(&self, id: &str) -> Result<bool, ReleaseStoreError> {
        Ok(self.inner.read().map_err(lock_error)?.ids.contains(id))
    }

    async fn insert(&self, release: &Release) -> Result<bool, ReleaseStoreError> {
        self.inner.write().map_err(lock_error)?.insert(release)
    }

    async fn count(&self) -> Result<usize, ReleaseStoreError> {
        Ok(self.inner.read().map_err(lock_error)?.data.releases.len())
    }

    async fn list(&self) -> Result<Vec<StoredRelease>, ReleaseStoreError> {
        Ok(self.inner.read().map_err(lock_error)?.data.releases.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::release;
    use tempfile::TempDir;

    fn test_store() -> (JsonReleaseStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("releases.json");
        let store = JsonReleaseStore::load_from_path(path).unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_insert_and_exists() {
        let (store, _temp) = test_store();

        assert!(!store.exists("R1").await.unwrap());
        assert!(store.insert(&release("R1", "2024-01-01")).await.unwrap());
        assert!(store.exists("R1").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_ignores_conflict() {
        let (store, _temp) = test_store();

        assert!(store.insert(&release("R1", "2024-01-01")).await.unwrap());

        let mut drifted = release("R1", "2024-02-02");
        drifted.name = "Renamed".to_string();
        assert!(!store.insert(&drifted).await.unwrap());

        let rows = store.list().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].release.name, "Release R1");
    }

    #[tokio::test]
    async fn test_invalid_release_rejected() {
        let (store, _temp) = test_store();

        let result = store.insert(&release("R1", "unknown")).await;
        assert!(matches!(result, Err(ReleaseStoreError::Invalid { .. })));
        assert!(!store.exists("R1").await.unwrap());
    }

    #[tokio::test]
    async fn test_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data").join("releases.json");

        {
            let store = JsonReleaseStore::load_from_path(path.clone()).unwrap();
            store.insert(&release("R1", "2024-01-01")).await.unwrap();
            store.insert(&release("R2", "2024-02-01")).await.unwrap();
        }

        let store = JsonReleaseStore::load_from_path(path).unwrap();
        assert!(store.exists("R1").await.unwrap());
        assert!(store.exists("R2").await.unwrap());

        let ids: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.release.id)
            .collect();
        assert_eq!(ids, vec!["R1", "R2"]);
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryReleaseStore::new();
        assert!(store.insert(&release("R1", "2024-01-01")).await.unwrap());
        assert!(!store.insert(&release("R1", "2024-01-01")).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
