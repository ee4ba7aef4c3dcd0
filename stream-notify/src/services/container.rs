//! Service container for dependency injection.
//!
//! The ServiceContainer builds every service from an [`AppConfig`] and
//! manages their background tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use twitch_helix::{HelixClient, TokenClient};

use crate::api::{ApiServer, ApiServerConfig, AppState};
use crate::config::{AppConfig, TwitchAuthConfig};
use crate::credentials::{CredentialProvider, StaticCredentials, TokenManager};
use crate::logging::LoggingConfig;
use crate::monitor::{HelixStatusClient, StreamStatusClient};
use crate::notification::{DiscordConfig, DiscordDispatcher, LogDispatcher, NotificationDispatcher};
use crate::registry::{SubscriptionService, TenantRegistry};
use crate::scheduler::{Reconciler, ReconcilerConfig, ReconcilerDeps};
use crate::store::{JsonFileTenantStore, TenantStore, migrate_guild_settings};
use crate::thumbnail::{AssetCache, ThumbnailConfig};
use crate::utils::http_client::build_client;
use crate::Result;

/// Default shutdown timeout.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Service container holding all application services.
pub struct ServiceContainer {
    pub config: AppConfig,
    pub registry: Arc<TenantRegistry>,
    pub credentials: Arc<dyn CredentialProvider>,
    /// Present when tokens come from the client-credentials grant.
    pub token_manager: Option<Arc<TokenManager>>,
    pub status: Arc<dyn StreamStatusClient>,
    pub assets: Arc<AssetCache>,
    pub dispatcher: Arc<dyn NotificationDispatcher>,
    pub subscriptions: Arc<SubscriptionService>,
    pub reconciler: Arc<Reconciler>,
    /// Cancellation token for graceful shutdown.
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("Initializing service container");

        let http = build_client(config.request_timeout);

        let store: Arc<dyn TenantStore> =
            Arc::new(JsonFileTenantStore::open(&config.settings_dir).await?);
        match migrate_guild_settings(&config.legacy_settings_file, store.as_ref()).await {
            Ok(0) => {}
            Ok(migrated) => {
                info!(tenants = migrated, file = %config.legacy_settings_file.display(), "Legacy settings imported");
            }
            Err(e) => {
                error!(file = %config.legacy_settings_file.display(), error = %e, "Legacy settings import failed; continuing without it");
            }
        }
        let registry = Arc::new(TenantRegistry::new(store));

        let (credentials, token_manager) = match &config.twitch_auth {
            TwitchAuthConfig::ClientCredentials { client_secret } => {
                let manager = Arc::new(TokenManager::new(
                    &config.twitch_client_id,
                    client_secret,
                    TokenClient::new(http.clone()),
                    config.token_refresh_interval,
                ));
                let provider: Arc<dyn CredentialProvider> = manager.clone();
                (provider, Some(manager))
            }
            TwitchAuthConfig::StaticToken { access_token } => {
                let provider: Arc<dyn CredentialProvider> = Arc::new(StaticCredentials::new(
                    &config.twitch_client_id,
                    access_token,
                ));
                (provider, None)
            }
        };

        let status: Arc<dyn StreamStatusClient> = Arc::new(HelixStatusClient::new(
            HelixClient::new(http.clone()),
            credentials.clone(),
            config.request_timeout,
        ));

        let assets = Arc::new(
            AssetCache::open(
                &config.thumbnail_dir,
                http.clone(),
                ThumbnailConfig {
                    width: config.thumbnail_width,
                    height: config.thumbnail_height,
                    timeout: config.request_timeout,
                },
            )
            .await?,
        );

        let dispatcher: Arc<dyn NotificationDispatcher> = match &config.discord_bot_token {
            Some(token) => {
                let mut discord = DiscordConfig::new(token);
                discord.footer = config.notify_footer.clone();
                Arc::new(DiscordDispatcher::new(discord, http.clone())?)
            }
            None => {
                warn!("DISCORD_BOT_TOKEN not set; live notifications will only be logged");
                Arc::new(LogDispatcher)
            }
        };

        let subscriptions = Arc::new(SubscriptionService::new(
            registry.clone(),
            status.clone(),
            assets.clone(),
        ));

        let reconciler = Arc::new(Reconciler::new(
            ReconcilerConfig {
                interval: config.poll_interval,
                max_concurrent_checks: config.max_concurrent_checks,
                dispatch_timeout: config.request_timeout.saturating_mul(3),
            },
            ReconcilerDeps {
                registry: registry.clone(),
                status: status.clone(),
                credentials: credentials.clone(),
                assets: assets.clone(),
                dispatcher: dispatcher.clone(),
            },
        ));

        info!(
            notifier = dispatcher.channel_type(),
            settings_dir = %config.settings_dir.display(),
            "Service container initialized"
        );

        Ok(Self {
            config,
            registry,
            credentials,
            token_manager,
            status,
            assets,
            dispatcher,
            subscriptions,
            reconciler,
            cancellation_token: CancellationToken::new(),
        })
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(
            self.registry.clone(),
            self.subscriptions.clone(),
            self.credentials.clone(),
            self.dispatcher.clone(),
        )
    }

    /// Spawn the token refresher, the one-off legacy login resolution, the
    /// reconciler and the API server.
    pub fn start(&self, logging: Option<Arc<LoggingConfig>>) -> Vec<JoinHandle<()>> {
        let cancel = self.cancellation_token.clone();
        let mut handles = Vec::new();

        if let Some(manager) = &self.token_manager {
            handles.push(tokio::spawn(manager.clone().run(cancel.clone())));
        }

        let token_manager = self.token_manager.clone();
        let subscriptions = self.subscriptions.clone();
        let legacy_cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            if let Some(manager) = token_manager {
                tokio::select! {
                    _ = legacy_cancel.cancelled() => return,
                    _ = manager.wait_until_ready() => {}
                }
            }
            if let Err(e) = subscriptions.resolve_legacy_logins().await {
                warn!(error = %e, "Failed to resolve legacy streamer logins");
            }
        }));

        handles.push(tokio::spawn(self.reconciler.clone().run(cancel.clone())));

        let mut state = self.app_state();
        if let Some(logging) = logging {
            state = state.with_logging_config(logging);
        }
        let server = ApiServer::new(
            ApiServerConfig {
                bind_address: self.config.bind_address.clone(),
                port: self.config.port,
                ..ApiServerConfig::default()
            },
            state,
        );
        let api_cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = server.run(api_cancel.clone()).await {
                error!(error = %e, "API server failed");
                api_cancel.cancel();
            }
        }));

        handles
    }

    /// Cancel every background task and wait for them to finish.
    pub async fn shutdown(&self, handles: Vec<JoinHandle<()>>) {
        info!("Shutting down services");
        self.cancellation_token.cancel();

        let join_all = futures::future::join_all(handles);
        match tokio::time::timeout(DEFAULT_SHUTDOWN_TIMEOUT, join_all).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        warn!(error = %e, "Background task ended abnormally");
                    }
                }
                debug!("All background tasks stopped");
            }
            Err(_) => warn!("Timed out waiting for background tasks to stop"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> AppConfig {
        let root = dir.path().to_path_buf();
        AppConfig::from_lookup(move |key| match key {
            "TWITCH_CLIENT_ID" => Some("cid".to_string()),
            "TWITCH_ACCESS_TOKEN" => Some("token".to_string()),
            "SETTINGS_DIR" => Some(root.join("settings").display().to_string()),
            "THUMBNAIL_DIR" => Some(root.join("thumbnails").display().to_string()),
            "LEGACY_SETTINGS_FILE" => Some(root.join("guild-settings.json").display().to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_unreadable_legacy_settings_do_not_block_startup() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("guild-settings.json"), "{ not json").unwrap();

        let container = ServiceContainer::new(config_in(&dir)).await.unwrap();

        assert!(container.registry.list_tenants().await.unwrap().is_empty());
        assert!(dir.path().join("guild-settings.json").exists());
    }

    #[tokio::test]
    async fn test_legacy_settings_are_imported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("guild-settings.json"),
            r#"{"g1":{"channelId":"555","streamers":[{"login":"nina","userid":"42"}]}}"#,
        )
        .unwrap();

        let container = ServiceContainer::new(config_in(&dir)).await.unwrap();

        let tenants = container.registry.list_tenants().await.unwrap();
        assert_eq!(tenants.len(), 1);
        assert_eq!(tenants[0].as_str(), "555");
    }
}
