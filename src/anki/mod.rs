use serde::Serialize;
use tracing::{
    debug,
    warn,
};

pub mod api;
pub mod settings;

pub use api::{
    AnkiConnect,
    AnkiRequest,
    ApiResponse,
};
pub use settings::{
    load_sync_settings,
    SyncSettings,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One `version` round trip. Never fails; an unreachable Anki is a status.
pub async fn check_connection(anki: &AnkiConnect) -> ConnectionStatus {
    match anki.version().await {
        Ok(version) => {
            debug!(version, url = anki.url(), "AnkiConnect is online");
            ConnectionStatus { connected: true, version: Some(version), error: None }
        }
        Err(err) => {
            warn!(url = anki.url(), error = %err, "AnkiConnect unreachable");
            ConnectionStatus {
                connected: false,
                version: None,
                error: Some("Could not connect to Anki. Is Anki running with AnkiConnect installed?".into()),
            }
        }
    }
}
