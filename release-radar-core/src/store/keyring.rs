//! Platform keyring backend (Keychain, Secret Service, Credential Manager).

use async_trait::async_trait;
use keyring::Entry;

use super::{Secret, SecretStore, StoreError, USER_REFRESH_TOKEN_KEY};

/// Keys this crate writes. Keyrings cannot enumerate entries, so
/// [`SecretStore::list_keys`] checks each of these.
const KNOWN_KEYS: &[&str] = &[USER_REFRESH_TOKEN_KEY];

/// Credential store in the OS keyring.
///
/// Every key is an entry of one keyring service, with the key as the entry's
/// user name.
#[derive(Debug)]
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    /// Open the keyring under `service`, failing when the platform has no
    /// usable backend.
    pub fn try_new(service: &str) -> Result<Self, StoreError> {
        Entry::new(service, "release-radar-check").map_err(|e| {
            StoreError::KeyringUnavailable {
                message: e.to_string(),
            }
        })?;

        Ok(Self {
            service: service.to_string(),
        })
    }

    fn entry(&self, key: &str) -> Result<Entry, StoreError> {
        Entry::new(&self.service, key).map_err(|e| backend_error(key, e))
    }
}

fn backend_error(key: &str, err: keyring::Error) -> StoreError {
    StoreError::BackendError {
        message: format!("keyring entry {}: {}", key, err),
    }
}

#[async_trait]
impl SecretStore for KeyringStore {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(Secret::new(value))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(backend_error(key, e)),
        }
    }

    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError> {
        self.entry(key)?
            .set_password(secret.expose())
            .map_err(|e| backend_error(key, e))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(backend_error(key, e)),
        }
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        for key in KNOWN_KEYS.iter().filter(|k| k.starts_with(prefix)) {
            if self.get(key).await?.is_some() {
                keys.push(key.to_string());
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keyring_missing_key() {
        let Ok(store) = KeyringStore::try_new("release-radar-test") else {
            return;
        };

        // Headless hosts without a keyring daemon report a backend error.
        match store.get("release-radar/test/absent").await {
            Ok(value) => assert!(value.is_none()),
            Err(e) => assert!(matches!(e, StoreError::BackendError { .. })),
        }
    }

    #[tokio::test]
    async fn test_keyring_list_keys_ignores_other_prefixes() {
        let Ok(store) = KeyringStore::try_new("release-radar-test-list") else {
            return;
        };

        let keys = store.list_keys("release-radar/service").await.unwrap();
        assert!(keys.is_empty());
    }
}
