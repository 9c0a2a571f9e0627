//! JSON file credential storage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::RwLock;

use super::{Secret, SecretStore, StoreError};

#[derive(Debug, Default, Serialize, Deserialize)]
struct FileStoreData {
    version: u32,
    secrets: BTreeMap<String, Secret>,
}

/// Credential store backed by a JSON file.
///
/// Every mutation rewrites the whole file through a temporary sibling that is
/// renamed into place. On unix the file is owner-only from the moment it is
/// created. A mutation whose write fails leaves memory unchanged.
pub struct FileStore {
    path: PathBuf,
    data: RwLock<FileStoreData>,
}

impl FileStore {
    /// Load the store from `path`, creating parent directories as needed.
    ///
    /// A missing file is treated as an empty store.
    pub fn load_from_path(path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            FileStoreData {
                version: 1,
                ..Default::default()
            }
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn save(&self, data: &FileStoreData) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(data)?;
        let tmp_path = self.path.with_extension("json.tmp");

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let written = options.open(&tmp_path).and_then(|mut file| {
            file.write_all(contents.as_bytes())?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|()| fs::rename(&tmp_path, &self.path)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        Ok(())
    }

    fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
        StoreError::BackendError {
            message: format!("lock poisoned: {}", e),
        }
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore").field("path", &self.path).finish()
    }
}

#[async_trait]
impl SecretStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        let data = self.data.read().map_err(Self::poisoned)?;
        Ok(data.secrets.get(key).cloned())
    }

    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError> {
        let mut data = self.data.write().map_err(Self::poisoned)?;
        let previous = data.secrets.insert(key.to_string(), secret.clone());

        if let Err(e) = self.save(&data) {
            match previous {
                Some(old) => data.secrets.insert(key.to_string(), old),
                None => data.secrets.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut data = self.data.write().map_err(Self::poisoned)?;
        if let Some(old) = data.secrets.remove(key) {
            if let Err(e) = self.save(&data) {
                data.secrets.insert(key.to_string(), old);
                return Err(e);
            }
        }
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let data = self.data.read().map_err(Self::poisoned)?;
        Ok(data
            .secrets
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::USER_REFRESH_TOKEN_KEY;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_store_survives_reload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("credentials.json");

        {
            let store = FileStore::load_from_path(path.clone()).unwrap();
            store
                .set(USER_REFRESH_TOKEN_KEY, &Secret::new("persisted"))
                .await
                .unwrap();
        }

        let store = FileStore::load_from_path(path).unwrap();
        let value = store.get(USER_REFRESH_TOKEN_KEY).await.unwrap().unwrap();
        assert_eq!(value.expose(), "persisted");
    }

    #[tokio::test]
    async fn test_file_store_delete_missing_key_is_ok() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::load_from_path(temp.path().join("c.json")).unwrap();

        store.delete("absent").await.unwrap();
        assert!(!store.path().exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let store = FileStore::load_from_path(temp.path().join("c.json")).unwrap();
        store.set("k", &Secret::new("v")).await.unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_replaces_world_readable_file() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("c.json");
        fs::write(&path, r#"{"version":1,"secrets":{}}"#).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let store = FileStore::load_from_path(path.clone()).unwrap();
        store
            .set(USER_REFRESH_TOKEN_KEY, &Secret::new("refresh"))
            .await
            .unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_failed_write_keeps_memory_unchanged() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("data");
        let store = FileStore::load_from_path(dir.join("c.json")).unwrap();
        store
            .set(USER_REFRESH_TOKEN_KEY, &Secret::new("old"))
            .await
            .unwrap();

        fs::remove_dir_all(&dir).unwrap();

        assert!(store.set(USER_REFRESH_TOKEN_KEY, &Secret::new("new")).await.is_err());
        assert!(store.set("other", &Secret::new("x")).await.is_err());
        assert!(store.delete(USER_REFRESH_TOKEN_KEY).await.is_err());

        let value = store.get(USER_REFRESH_TOKEN_KEY).await.unwrap().unwrap();
        assert_eq!(value.expose(), "old");
        assert!(store.get("other").await.unwrap().is_none());
    }
}
