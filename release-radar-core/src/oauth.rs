//! OAuth 2.0 client construction and grant response handling.
//!
//! The catalog's token endpoint authenticates the client with HTTP Basic auth
//! and supports the `client_credentials`, `authorization_code` and
//! `refresh_token` grants.

use chrono::{DateTime, Duration, Utc};
use oauth2::{
    AuthUrl, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope, TokenResponse, TokenUrl,
    basic::{BasicClient, BasicTokenResponse},
};
use serde::{Deserialize, Serialize};

use crate::store::Secret;
use crate::token::TokenError;

/// Lifetime assumed when the provider omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// OAuth client settings for the catalog provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: Secret,
    pub auth_url: String,
    pub token_url: String,
    /// Required for the authorization-code grant; must match the URL registered
    /// with the provider.
    pub redirect_uri: Option<String>,
    /// Scopes requested when building the user authorization URL.
    pub scopes: Vec<String>,
}

/// Create an OAuth2 client from the settings.
pub fn create_oauth_client(settings: &OAuthSettings) -> Result<BasicClient, TokenError> {
    let auth_url = AuthUrl::new(settings.auth_url.clone()).map_err(|e| TokenError::OAuthError {
        message: format!("invalid auth URL: {}", e),
    })?;

    let token_url =
        TokenUrl::new(settings.token_url.clone()).map_err(|e| TokenError::OAuthError {
            message: format!("invalid token URL: {}", e),
        })?;

    let mut client = BasicClient::new(
        ClientId::new(settings.client_id.clone()),
        Some(ClientSecret::new(settings.client_secret.expose().to_string())),
        auth_url,
        Some(token_url),
    );

    if let Some(redirect) = &settings.redirect_uri {
        let redirect_url =
            RedirectUrl::new(redirect.clone()).map_err(|e| TokenError::OAuthError {
                message: format!("invalid redirect URL: {}", e),
            })?;
        client = client.set_redirect_uri(redirect_url);
    }

    Ok(client)
}

/// Build the URL the user visits to authorize playlist access.
///
/// Returns the URL and the CSRF state the redirect must echo back.
pub fn authorization_url(settings: &OAuthSettings) -> Result<(String, String), TokenError> {
    if settings.redirect_uri.is_none() {
        return Err(TokenError::OAuthError {
            message: "redirect_uri must be configured to authorize a user".to_string(),
        });
    }

    let client = create_oauth_client(settings)?;
    let mut request = client.authorize_url(CsrfToken::new_random);
    for scope in &settings.scopes {
        request = request.add_scope(Scope::new(scope.clone()));
    }

    let (url, state) = request.url();
    Ok((url.to_string(), state.secret().to_string()))
}

/// The useful parts of a successful token response.
#[derive(Debug, Clone)]
pub struct Grant {
    pub access_token: Secret,
    pub expires_at: DateTime<Utc>,
    pub refresh_token: Option<Secret>,
    pub scopes: Vec<String>,
}

impl Grant {
    /// Convert a token response, anchoring the relative lifetime at `issued_at`.
    pub fn from_response(
        response: &BasicTokenResponse,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, TokenError> {
        let lifetime = match response.expires_in() {
            Some(duration) => Duration::from_std(duration).map_err(|e| TokenError::OAuthError {
                message: format!("invalid expiration duration: {}", e),
            })?,
            None => Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS),
        };

        let expires_at = issued_at
            .checked_add_signed(lifetime)
            .ok_or_else(|| TokenError::OAuthError {
                message: format!("token lifetime of {}s is out of range", lifetime.num_seconds()),
            })?;

        let scopes = response
            .scopes()
            .map(|s| s.iter().map(|scope| scope.to_string()).collect())
            .unwrap_or_default();

        Ok(Self {
            access_token: Secret::new(response.access_token().secret().as_str()),
            expires_at,
            refresh_token: response
                .refresh_token()
                .map(|r| Secret::new(r.secret().as_str())),
            scopes,
        })
    }
}
