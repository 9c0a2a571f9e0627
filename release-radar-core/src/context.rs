//! Assembly of the runtime object graph from configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::catalog::CatalogClient;
use crate::config::RadarConfig;
use crate::digest::MarkdownDigest;
use crate::error::RadarError;
use crate::release_store::JsonReleaseStore;
use crate::store::{SecretStore, create_store};
use crate::sync::{PipelineSettings, SyncPipeline, SyncService};
use crate::token_manager::DefaultTokenManager;

/// Token manager over whichever credential backend was configured.
pub type RadarTokenManager = DefaultTokenManager<Box<dyn SecretStore>>;

/// Everything a daemon or CLI invocation needs, wired together.
pub struct RadarContext {
    pub config: RadarConfig,
    pub tokens: Arc<RadarTokenManager>,
    pub catalog: Arc<CatalogClient>,
    pub sync: Arc<SyncService>,
}

impl RadarContext {
    /// Open the stores and build the pipeline.
    ///
    /// An authorization code from the configuration is staged for the first
    /// user-scope grant.
    pub async fn from_config(config: RadarConfig) -> Result<Self, RadarError> {
        let secrets = create_store(config.sync.credential_backend, &config.sync.data_dir)?;

        let tokens = Arc::new(RadarTokenManager::with_expiry_buffer(
            secrets,
            config.oauth_settings(),
            config.catalog.expiry_buffer_secs,
        ));
        if let Some(code) = &config.catalog.authorization_code {
            tokens.set_authorization_code(code.expose()).await;
            tracing::debug!("Staged authorization code from environment");
        }

        let catalog = Arc::new(CatalogClient::new(
            config.catalog.api_base_url.clone(),
            tokens.clone(),
            Duration::from_secs(config.catalog.request_timeout_secs),
        )?);

        let releases = Arc::new(JsonReleaseStore::load_from_path(config.release_store_path())?);
        let digest = Arc::new(MarkdownDigest::new(config.sync.output_dir.clone()));

        let pipeline = SyncPipeline::new(
            tokens.clone(),
            catalog.clone(),
            releases,
            digest,
            PipelineSettings::from(&config.sync),
        );

        Ok(Self {
            config,
            tokens,
            catalog,
            sync: Arc::new(SyncService::new(pipeline)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TokenScope;
    use crate::store::CredentialBackend;
    use crate::token::TokenManager;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_from_config_creates_stores_in_data_dir() {
        let temp = TempDir::new().unwrap();
        let mut config = RadarConfig::default();
        config.sync.data_dir = temp.path().join("data");
        config.sync.credential_backend = CredentialBackend::File;

        let context = RadarContext::from_config(config).await.unwrap();

        assert!(temp.path().join("data").is_dir());
        assert_eq!(
            context.config.release_store_path(),
            temp.path().join("data").join("releases.json")
        );
        assert!(context.sync.last_report().await.is_none());

        let status = context.tokens.slot_status(TokenScope::User).await;
        assert!(!status.has_refresh_token);
    }
}
