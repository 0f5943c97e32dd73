use std::sync::Arc;

use reqwest::Client;
use tracing::{
    info,
    warn,
};

use crate::{
    anki::{
        settings::anki_connect_url,
        AnkiConnect,
    },
    auth::{
        AuthManager,
        AuthProvider,
        SessionRecovery,
        SupabaseAuth,
    },
    config::AppConfig,
    core::{
        http::http_client,
        Result,
    },
    notifications::NotificationRelay,
    persistence::{
        keys,
        Storage,
        StorageArea,
    },
    planner::{
        CardStore,
        PlannerClient,
    },
    router::keepalive::KeepAlive,
    session::SessionStore,
    sync::SyncService,
};

/// Every long-lived collaborator, built once at startup and shared.
pub struct AppContext {
    pub config: AppConfig,
    pub client: Client,
    pub storage: Storage,
    pub notifications: Arc<NotificationRelay>,
    pub keepalive: Arc<KeepAlive>,
    pub sessions: SessionStore,
    pub auth: Arc<AuthManager>,
    pub sync: SyncService,
}

/// Persisted project settings win over the config file.
async fn supabase_project(storage: &Storage, config: &AppConfig) -> Option<(String, String)> {
    let stored = |key: &'static str| async move {
        storage.get_typed::<String>(StorageArea::Local, key).await.ok().flatten().filter(|s| !s.trim().is_empty())
    };

    let url = stored(keys::SUPABASE_URL).await.or_else(|| config.supabase_url.clone());
    let anon_key = stored(keys::SUPABASE_ANON_KEY).await.or_else(|| config.supabase_anon_key.clone());
    url.zip(anon_key)
}

impl AppContext {
    pub async fn build(config: AppConfig, storage: Storage) -> Result<Arc<Self>> {
        let provider = supabase_project(&storage, &config).await;
        Self::build_with(config, storage, provider).await
    }

    /// `project` is the Supabase `(url, anon_key)` pair, if any.
    pub async fn build_with(
        config: AppConfig,
        storage: Storage,
        project: Option<(String, String)>,
    ) -> Result<Arc<Self>> {
        let client = http_client(config.http_timeout_secs)?;
        let notifications = Arc::new(NotificationRelay::new(storage.clone()));
        let keepalive = Arc::new(KeepAlive::new());
        let sessions = SessionStore::new(storage.clone());
        let recovery = SessionRecovery::new(sessions.clone(), notifications.clone(), config.retry);

        let (provider, card_store) = match &project {
            Some((url, anon_key)) => {
                info!(url = %url, "Supabase project configured");
                let provider: Arc<dyn AuthProvider> =
                    Arc::new(SupabaseAuth::new(client.clone(), url.clone(), anon_key.clone()));
                (Some(provider), Some(CardStore::new(client.clone(), url.clone(), anon_key.clone())))
            }
            None => {
                warn!("No Supabase project configured; auth and card write-back are unavailable");
                (None, None)
            }
        };

        let auth = Arc::new(AuthManager::new(
            provider,
            sessions.clone(),
            recovery,
            notifications.clone(),
            keepalive.clone(),
        ));
        let planner = PlannerClient::new(client.clone(), config.planner_url.clone());
        let sync = SyncService::new(
            client.clone(),
            storage.clone(),
            planner,
            card_store,
            auth.clone(),
            notifications.clone(),
            config.update_strategy,
        );

        Ok(Arc::new(Self { config, client, storage, notifications, keepalive, sessions, auth, sync }))
    }

    /// Client for calls that only need the endpoint, not a deck.
    pub async fn anki(&self) -> Result<AnkiConnect> {
        let url = anki_connect_url(&self.storage, &self.config.default_anki_connect_url).await?;
        Ok(AnkiConnect::new(self.client.clone(), url))
    }
}
