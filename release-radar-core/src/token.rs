//! Token types for catalog API access.
//!
//! This module provides:
//! - [`Token`] - An access token handed to callers
//! - [`CredentialSlot`] - The cached credential state of one scope
//! - [`SlotStatus`] - Secret-free view of a slot for status reporting
//! - [`TokenManager`] - Trait for token lifecycle management

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::TokenScope;
use crate::store::Secret;

/// Error type for token operations.
#[derive(Debug, Error)]
pub enum TokenError {
    /// No cached token, no working refresh credential and no way to mint one.
    #[error("no usable credential for {scope} scope")]
    NotFound { scope: TokenScope },

    /// Refresh-token grant failed.
    #[error("token refresh failed: {message}")]
    RefreshFailed { message: String },

    /// Initial grant (client credentials or authorization code) failed.
    #[error("{grant} grant failed: {message}")]
    GrantFailed { grant: &'static str, message: String },

    /// OAuth client configuration is invalid.
    #[error("OAuth configuration error: {message}")]
    OAuthError { message: String },

    /// Credential store error while loading or persisting the refresh credential.
    #[error("storage error: {0}")]
    StorageError(#[from] crate::store::StoreError),
}

/// An access token with its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// The bearer value.
    pub access_token: Secret,

    /// Token type (usually "Bearer").
    pub token_type: String,

    /// When this token expires.
    pub expires_at: Option<DateTime<Utc>>,

    /// OAuth scopes granted with this token.
    pub scopes: Vec<String>,
}

impl Token {
    /// Create a new bearer token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access_token),
            token_type: "Bearer".to_string(),
            expires_at: None,
            scopes: Vec::new(),
        }
    }

    /// Create a token with an expiration time.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Create a token with scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Check if this token has expired.
    ///
    /// Returns `false` if no expiration is set.
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|exp| exp <= Utc::now()).unwrap_or(false)
    }

    /// Value for an `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token.expose())
    }
}

/// Cached credential state for one [`TokenScope`].
///
/// An access token is usable only while `now < expires_at`; a slot with no
/// expiry is never reused.
#[derive(Debug, Clone, Default)]
pub struct CredentialSlot {
    pub access_token: Option<Secret>,
    pub expires_at: Option<DateTime<Utc>>,
    pub refresh_token: Option<Secret>,
    pub scopes: Vec<String>,
}

impl CredentialSlot {
    /// Slot holding only a refresh credential, as after a restart.
    pub fn from_refresh_token(refresh_token: Secret) -> Self {
        Self {
            refresh_token: Some(refresh_token),
            ..Default::default()
        }
    }

    /// Return the cached token if it is still usable at `now`.
    ///
    /// `buffer` shortens the validity window so a token is not handed out
    /// moments before it lapses.
    pub fn usable_token(&self, now: DateTime<Utc>, buffer: Duration) -> Option<Token> {
        let access_token = self.access_token.as_ref()?;
        let expires_at = self.expires_at?;

        if now + buffer < expires_at {
            Some(Token {
                access_token: access_token.clone(),
                token_type: "Bearer".to_string(),
                expires_at: Some(expires_at),
                scopes: self.scopes.clone(),
            })
        } else {
            None
        }
    }

    /// Secret-free summary of the slot.
    pub fn status(&self, scope: TokenScope, now: DateTime<Utc>) -> SlotStatus {
        SlotStatus {
            scope,
            has_access_token: self.access_token.is_some(),
            expires_at: self.expires_at,
            has_refresh_token: self.refresh_token.is_some(),
            usable: self.usable_token(now, Duration::zero()).is_some(),
        }
    }
}

/// Status of a credential slot, safe to log or return over RPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStatus {
    pub scope: TokenScope,
    pub has_access_token: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub has_refresh_token: bool,
    pub usable: bool,
}

/// Trait for managing the token lifecycle of both scopes.
///
/// # Example
///
/// ```rust,ignore
/// use release_radar_core::{TokenManager, TokenScope};
///
/// async fn list_albums(manager: &impl TokenManager) -> Result<(), TokenError> {
///     let token = manager.ensure_access_token(TokenScope::Service).await?;
///     // Send token.bearer() as the Authorization header
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait TokenManager: Send + Sync {
    /// Get a valid access token for `scope`, refreshing or minting if necessary.
    ///
    /// 1. Returns the cached token while it is valid
    /// 2. Otherwise tries the refresh-token grant if a refresh credential is held
    /// 3. Otherwise (or if refresh failed) runs the scope's initial grant
    async fn ensure_access_token(&self, scope: TokenScope) -> Result<Token, TokenError>;

    /// Load the persisted user refresh credential into the user slot.
    ///
    /// A slot that already holds a refresh token keeps it. Returns `true` if a
    /// credential was found in the store.
    async fn load_user_credential(&self) -> Result<bool, TokenError>;

    /// Current status of a slot without touching the network.
    async fn slot_status(&self, scope: TokenScope) -> SlotStatus;
}
