//! Process-local credential store.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{Secret, SecretStore, StoreError};

/// Keeps secrets for the lifetime of the process.
///
/// Backs the `memory` credential backend and the tests. A user authorized
/// against it has to authorize again after a restart.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Secret>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-filled with `(key, secret)` pairs.
    pub fn seeded<K: Into<String>>(entries: impl IntoIterator<Item = (K, Secret)>) -> Self {
        Self {
            entries: Mutex::new(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }

    fn entries(&self) -> Result<MutexGuard<'_, BTreeMap<String, Secret>>, StoreError> {
        self.entries.lock().map_err(|_| StoreError::BackendError {
            message: "memory store lock poisoned".to_string(),
        })
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self
            .entries()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("MemoryStore").field("keys", &keys).finish()
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        Ok(self.entries()?.get(key).cloned())
    }

    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError> {
        self.entries()?.insert(key.to_string(), secret.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries()?.remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        // Ordered map: keys sharing the prefix are contiguous.
        Ok(self
            .entries()?
            .range(prefix.to_string()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
