use thiserror::Error;
use tokio::sync::mpsc::error::SendError;
use tokio_tungstenite::tungstenite;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("I/O error: {0}")]
    Io(Box<std::io::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Reqwest(Box<reqwest::Error>),

    #[error("WebSocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),

    #[error("WebSocket send error: {0}")]
    WebSocketSend(String),

    #[error("Anki settings not configured")]
    NotConfigured,

    /// Body of a non-2xx planner response, surfaced as-is.
    #[error("{0}")]
    Planner(String),

    #[error("AnkiConnect error: {0}")]
    AnkiConnect(String),

    #[error("Card store error: {0}")]
    CardStore(String),

    #[error("{message}")]
    Auth { message: String, code: Option<String> },

    #[error("Auth session missing")]
    NotSignedIn,

    #[error("Invalid message payload: {0}")]
    InvalidMessage(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Media fetch failed: {0}")]
    MediaFetch(String),

    #[error("{0}")]
    Custom(String),
}

impl SyncError {
    pub fn auth(message: impl Into<String>) -> Self {
        SyncError::Auth { message: message.into(), code: None }
    }

    /// Machine-readable code attached by the identity provider, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            SyncError::Auth { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

impl<T> From<SendError<T>> for SyncError {
    fn from(error: SendError<T>) -> Self {
        SyncError::WebSocketSend(error.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(error: std::io::Error) -> Self {
        SyncError::Io(Box::new(error))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(error: reqwest::Error) -> Self {
        SyncError::Reqwest(Box::new(error))
    }
}

impl From<tungstenite::Error> for SyncError {
    fn from(error: tungstenite::Error) -> Self {
        SyncError::WebSocket(Box::new(error))
    }
}
