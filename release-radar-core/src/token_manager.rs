//! Default implementation of the [`TokenManager`] trait.
//!
//! [`DefaultTokenManager`] owns the two credential slots of a process:
//!
//! - `service`: minted with the client-credentials grant, refresh credential
//!   kept in memory only
//! - `user`: minted with the authorization-code grant, refresh credential
//!   persisted through a [`SecretStore`] so it survives restarts
//!
//! Each slot sits behind its own async mutex that is held across the token
//! exchange, so concurrent callers of one scope trigger a single refresh and
//! the rest observe its result.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example(settings: release_radar_core::oauth::OAuthSettings) -> Result<(), Box<dyn std::error::Error>> {
//! use release_radar_core::{DefaultTokenManager, MemoryStore, TokenManager, TokenScope};
//!
//! let manager = DefaultTokenManager::new(MemoryStore::new(), settings);
//! manager.load_user_credential().await?;
//!
//! let token = manager.ensure_access_token(TokenScope::Service).await?;
//! println!("Token expires at {:?}", token.expires_at);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{Duration, Utc};
use oauth2::{AuthorizationCode, RefreshToken, reqwest::async_http_client};
use tokio::sync::Mutex;

use crate::{
    model::TokenScope,
    oauth::{Grant, OAuthSettings, create_oauth_client},
    store::{Secret, SecretStore, USER_REFRESH_TOKEN_KEY},
    token::{CredentialSlot, SlotStatus, Token, TokenError, TokenManager},
};

/// Default expiry buffer in seconds.
///
/// A cached token is not handed out during the last seconds of its lifetime.
const DEFAULT_EXPIRY_BUFFER_SECS: u32 = 30;

/// Token manager holding the service and user credential slots.
///
/// # Type Parameters
///
/// * `S` - The credential store that persists the user refresh token
pub struct DefaultTokenManager<S: SecretStore> {
    store: S,
    settings: OAuthSettings,
    service: Mutex<CredentialSlot>,
    user: Mutex<CredentialSlot>,
    pending_code: Mutex<Option<Secret>>,
    expiry_buffer: Duration,
}

impl<S: SecretStore> DefaultTokenManager<S> {
    /// Create a token manager with empty slots and the default expiry buffer.
    pub fn new(store: S, settings: OAuthSettings) -> Self {
        Self::with_expiry_buffer(store, settings, DEFAULT_EXPIRY_BUFFER_SECS)
    }

    /// Create a token manager with a custom expiry buffer.
    pub fn with_expiry_buffer(store: S, settings: OAuthSettings, expiry_buffer_secs: u32) -> Self {
        Self {
            store,
            settings,
            service: Mutex::new(CredentialSlot::default()),
            user: Mutex::new(CredentialSlot::default()),
            pending_code: Mutex::new(None),
            expiry_buffer: Duration::seconds(i64::from(expiry_buffer_secs)),
        }
    }

    /// The credential store behind the user slot.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Stage a one-time authorization code for the next user-scope grant.
    ///
    /// The code is consumed by the first grant attempt, successful or not.
    pub async fn set_authorization_code(&self, code: impl Into<String>) {
        *self.pending_code.lock().await = Some(Secret::new(code));
    }

    /// Exchange an authorization code right away and persist the resulting
    /// refresh credential.
    ///
    /// Unlike the lazy path in [`ensure_access_token`](TokenManager::ensure_access_token),
    /// a failure to persist is returned to the caller.
    pub async fn authorize_user(&self, code: &str) -> Result<Token, TokenError> {
        let mut slot = self.user.lock().await;

        let grant = self.exchange_code(code).await?;
        let (token, rotated) = Self::apply_grant(&mut slot, grant);

        match rotated {
            Some(refresh) => self.persist_user_refresh(&refresh).await?,
            None => tracing::warn!(
                "Authorization-code grant returned no refresh token; \
                 the user will need to re-authorize once the access token expires"
            ),
        }

        tracing::info!("Authorized user scope, token expires at {:?}", token.expires_at);
        Ok(token)
    }

    fn slot(&self, scope: TokenScope) -> &Mutex<CredentialSlot> {
        match scope {
            TokenScope::Service => &self.service,
            TokenScope::User => &self.user,
        }
    }

    /// Overwrite the slot with a fresh grant.
    ///
    /// Returns the token and, if the grant carried one, the new refresh credential.
    /// Without a new refresh credential the previous one is kept.
    fn apply_grant(slot: &mut CredentialSlot, grant: Grant) -> (Token, Option<Secret>) {
        slot.access_token = Some(grant.access_token.clone());
        slot.expires_at = Some(grant.expires_at);
        slot.scopes = grant.scopes.clone();

        let rotated = grant.refresh_token.clone();
        if let Some(refresh) = &grant.refresh_token {
            slot.refresh_token = Some(refresh.clone());
        }

        let token = Token {
            access_token: grant.access_token,
            token_type: "Bearer".to_string(),
            expires_at: Some(grant.expires_at),
            scopes: grant.scopes,
        };

        (token, rotated)
    }

    async fn persist_user_refresh(&self, refresh: &Secret) -> Result<(), TokenError> {
        self.store.set(USER_REFRESH_TOKEN_KEY, refresh).await?;
        tracing::debug!("Persisted user refresh credential");
        Ok(())
    }

    async fn exchange_refresh(&self, refresh_token: &Secret) -> Result<Grant, TokenError> {
        let client = create_oauth_client(&self.settings)?;
        let issued_at = Utc::now();

        let response = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.expose().to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| TokenError::RefreshFailed {
                message: e.to_string(),
            })?;

        Grant::from_response(&response, issued_at)
    }

    async fn exchange_client_credentials(&self) -> Result<Grant, TokenError> {
        let client = create_oauth_client(&self.settings)?;
        let issued_at = Utc::now();

        let response = client
            .exchange_client_credentials()
            .request_async(async_http_client)
            .await
            .map_err(|e| TokenError::GrantFailed {
                grant: "client_credentials",
                message: e.to_string(),
            })?;

        Grant::from_response(&response, issued_at)
    }

    async fn exchange_code(&self, code: &str) -> Result<Grant, TokenError> {
        let client = create_oauth_client(&self.settings)?;
        let issued_at = Utc::now();

        let response = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| TokenError::GrantFailed {
                grant: "authorization_code",
                message: e.to_string(),
            })?;

        Grant::from_response(&response, issued_at)
    }

    /// Run the scope's initial grant.
    async fn initial_grant(&self, scope: TokenScope) -> Result<Grant, TokenError> {
        match scope {
            TokenScope::Service => self.exchange_client_credentials().await,
            TokenScope::User => {
                let code = self
                    .pending_code
                    .lock()
                    .await
                    .take()
                    .ok_or(TokenError::NotFound { scope })?;
                self.exchange_code(code.expose()).await
            }
        }
    }
}

#[async_trait]
impl<S: SecretStore + Send + Sync + 'static> TokenManager for DefaultTokenManager<S> {
    async fn ensure_access_token(&self, scope: TokenScope) -> Result<Token, TokenError> {
        let mut slot = self.slot(scope).lock().await;

        if let Some(token) = slot.usable_token(Utc::now(), self.expiry_buffer) {
            tracing::debug!(%scope, "Using cached access token");
            return Ok(token);
        }

        if let Some(refresh_token) = slot.refresh_token.clone() {
            tracing::info!(%scope, "Access token missing or expired, attempting refresh");

            match self.exchange_refresh(&refresh_token).await {
                Ok(grant) => {
                    let (token, rotated) = Self::apply_grant(&mut slot, grant);
                    if let (TokenScope::User, Some(refresh)) = (scope, rotated) {
                        if let Err(e) = self.persist_user_refresh(&refresh).await {
                            tracing::error!("Failed to persist rotated user refresh token: {}", e);
                        }
                    }
                    tracing::info!(%scope, "Successfully refreshed access token");
                    return Ok(token);
                }
                Err(e) => {
                    tracing::error!(%scope, "Failed to refresh access token: {}", e);
                }
            }
        }

        let grant = match self.initial_grant(scope).await {
            Ok(grant) => grant,
            Err(e) => {
                tracing::error!(%scope, "Failed to obtain access token: {}", e);
                return Err(e);
            }
        };

        let (token, refresh) = Self::apply_grant(&mut slot, grant);
        if scope == TokenScope::User {
            match refresh {
                Some(refresh) => {
                    if let Err(e) = self.persist_user_refresh(&refresh).await {
                        tracing::error!(
                            "Failed to persist user refresh token, re-authorization will be \
                             required after restart: {}",
                            e
                        );
                    }
                }
                None => tracing::warn!("Authorization-code grant returned no refresh token"),
            }
        }

        tracing::info!(%scope, "Obtained new access token");
        Ok(token)
    }

    async fn load_user_credential(&self) -> Result<bool, TokenError> {
        let Some(refresh) = self.store.get(USER_REFRESH_TOKEN_KEY).await? else {
            tracing::debug!("No persisted user refresh credential");
            return Ok(false);
        };

        // A refresh token already in the slot is at least as new as the stored
        // one: rotation updates the slot first and persistence can fail.
        let mut slot = self.user.lock().await;
        match &slot.refresh_token {
            None => {
                *slot = CredentialSlot::from_refresh_token(refresh);
                tracing::debug!("Loaded persisted user refresh credential");
            }
            Some(current) if *current != refresh => {
                tracing::debug!("Keeping in-memory user refresh credential over the stored one");
            }
            Some(_) => {}
        }
        Ok(true)
    }

    async fn slot_status(&self, scope: TokenScope) -> SlotStatus {
        self.slot(scope).lock().await.status(scope, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn settings() -> OAuthSettings {
        OAuthSettings {
            client_id: "client".to_string(),
            client_secret: Secret::new("secret"),
            auth_url: "https://accounts.example.com/authorize".to_string(),
            // Nothing listens here; tests below never reach the network.
            token_url: "http://127.0.0.1:9/api/token".to_string(),
            redirect_uri: Some("http://localhost:8888/callback".to_string()),
            scopes: vec![],
        }
    }

    #[tokio::test]
    async fn test_user_scope_without_credentials_is_not_found() {
        let manager = DefaultTokenManager::new(MemoryStore::new(), settings());

        let result = manager.ensure_access_token(TokenScope::User).await;
        assert!(matches!(
            result,
            Err(TokenError::NotFound {
                scope: TokenScope::User
            })
        ));
    }

    #[tokio::test]
    async fn test_load_user_credential() {
        let store = MemoryStore::new();
        store
            .set(USER_REFRESH_TOKEN_KEY, &Secret::new("persisted"))
            .await
            .unwrap();
        let manager = DefaultTokenManager::new(store, settings());

        assert!(manager.load_user_credential().await.unwrap());

        let user = manager.slot_status(TokenScope::User).await;
        assert!(user.has_refresh_token);
        assert!(!user.usable);

        let service = manager.slot_status(TokenScope::Service).await;
        assert!(!service.has_refresh_token);
    }

    #[tokio::test]
    async fn test_load_user_credential_missing() {
        let manager = DefaultTokenManager::new(MemoryStore::new(), settings());
        assert!(!manager.load_user_credential().await.unwrap());
    }

    #[tokio::test]
    async fn test_reload_keeps_cached_user_token() {
        let store = MemoryStore::new();
        store
            .set(USER_REFRESH_TOKEN_KEY, &Secret::new("persisted"))
            .await
            .unwrap();
        let manager = DefaultTokenManager::new(store, settings());

        {
            let mut slot = manager.user.lock().await;
            slot.access_token = Some(Secret::new("live"));
            slot.expires_at = Some(Utc::now() + Duration::hours(1));
            slot.refresh_token = Some(Secret::new("persisted"));
        }

        manager.load_user_credential().await.unwrap();
        let token = manager.ensure_access_token(TokenScope::User).await.unwrap();
        assert_eq!(token.access_token.expose(), "live");
    }

    #[tokio::test]
    async fn test_reload_keeps_rotated_user_token_over_stale_store() {
        let store = MemoryStore::new();
        store
            .set(USER_REFRESH_TOKEN_KEY, &Secret::new("stale"))
            .await
            .unwrap();
        let manager = DefaultTokenManager::new(store, settings());

        {
            let mut slot = manager.user.lock().await;
            slot.access_token = Some(Secret::new("live"));
            slot.expires_at = Some(Utc::now() + Duration::hours(1));
            slot.refresh_token = Some(Secret::new("rotated"));
        }

        assert!(manager.load_user_credential().await.unwrap());

        let slot = manager.user.lock().await;
        assert_eq!(slot.refresh_token.as_ref().unwrap().expose(), "rotated");
        assert_eq!(slot.access_token.as_ref().unwrap().expose(), "live");
    }

    #[tokio::test]
    async fn test_slots_are_not_conflated() {
        let manager = DefaultTokenManager::new(MemoryStore::new(), settings());
        {
            let mut slot = manager.user.lock().await;
            slot.access_token = Some(Secret::new("user-token"));
            slot.expires_at = Some(Utc::now() + Duration::hours(1));
        }

        let user = manager.ensure_access_token(TokenScope::User).await.unwrap();
        assert_eq!(user.access_token.expose(), "user-token");

        // The service slot is empty, so it must try its own grant (and fail here)
        // rather than reuse the user token.
        let service = manager.ensure_access_token(TokenScope::Service).await;
        assert!(matches!(service, Err(TokenError::GrantFailed { .. })));
    }
}
