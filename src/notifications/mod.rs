use serde::{
    Deserialize,
    Serialize,
};
use tokio::sync::{
    broadcast,
    Mutex,
};
use tracing::{
    debug,
    info,
};
use uuid::Uuid;

use crate::{
    core::{
        utils::now_millis,
        Result,
    },
    persistence::{
        keys,
        Storage,
        StorageArea,
    },
};

pub const MAX_HISTORY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Warning,
    Error,
    Info,
}

/// What a surface does locally when the action button is clicked. These
/// are UI intents, not router requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionIntent {
    OpenSignIn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub label: String,
    pub intent: ActionIntent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<NotificationAction>,
    #[serde(default)]
    pub persistent: bool,
    pub timestamp: i64,
}

impl Notification {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            title: title.into(),
            message: message.into(),
            action: None,
            persistent: false,
            timestamp: now_millis(),
        }
    }

    pub fn with_action(mut self, label: impl Into<String>, intent: ActionIntent) -> Self {
        self.action = Some(NotificationAction { label: label.into(), intent });
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn session_expired(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Warning, "Session expired", message)
            .with_action("Sign in", ActionIntent::OpenSignIn)
            .persistent()
    }
}

/// Persists a short history and fans every new notification out to the
/// surfaces that are currently open.
pub struct NotificationRelay {
    storage: Storage,
    tx: broadcast::Sender<Notification>,
    // serialises read-modify-write of the history key
    write_lock: Mutex<()>,
}

impl NotificationRelay {
    pub fn new(storage: Storage) -> Self {
        let (tx, _) = broadcast::channel(32);
        Self { storage, tx, write_lock: Mutex::new(()) }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub async fn notify(&self, notification: Notification) -> Result<()> {
        {
            let _guard = self.write_lock.lock().await;
            let mut history = self.history().await?;
            history.insert(0, notification.clone());
            history.truncate(MAX_HISTORY);
            self.storage.set_typed(StorageArea::Local, keys::NOTIFICATION_HISTORY, &history).await?;
        }

        info!(kind = ?notification.kind, title = %notification.title, "Notification");
        // no open surface is fine; the history still has it
        if self.tx.send(notification).is_err() {
            debug!("No surfaces listening for notifications");
        }
        Ok(())
    }

    pub async fn success(&self, title: &str, message: impl Into<String>) -> Result<()> {
        self.notify(Notification::new(NotificationKind::Success, title, message)).await
    }

    pub async fn warning(&self, title: &str, message: impl Into<String>) -> Result<()> {
        self.notify(Notification::new(NotificationKind::Warning, title, message)).await
    }

    pub async fn error(&self, title: &str, message: impl Into<String>) -> Result<()> {
        self.notify(Notification::new(NotificationKind::Error, title, message)).await
    }

    /// Most recent first. A damaged history is treated as empty.
    pub async fn history(&self) -> Result<Vec<Notification>> {
        Ok(self
            .storage
            .get_typed::<Vec<Notification>>(StorageArea::Local, keys::NOTIFICATION_HISTORY)
            .await
            .unwrap_or_default()
            .unwrap_or_default())
    }

    pub async fn dismiss(&self, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut history = self.history().await?;
        let before = history.len();
        history.retain(|n| n.id != id);
        if history.len() == before {
            return Ok(false);
        }
        self.storage.set_typed(StorageArea::Local, keys::NOTIFICATION_HISTORY, &history).await?;
        Ok(true)
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.storage.remove(StorageArea::Local, keys::NOTIFICATION_HISTORY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_history_capped_newest_first() {
        let relay = NotificationRelay::new(Storage::in_memory());
        for i in 1..=6 {
            relay.success("Synced", format!("batch {i}")).await.unwrap();
        }

        let history = relay.history().await.unwrap();
        assert_eq!(history.len(), MAX_HISTORY);
        assert_eq!(history[0].message, "batch 6");
        assert_eq!(history[4].message, "batch 2");
        assert!(history.iter().all(|n| n.message != "batch 1"));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let relay = NotificationRelay::new(Storage::in_memory());
        let mut rx = relay.subscribe();

        relay.notify(Notification::session_expired("Please sign in again.")).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, NotificationKind::Warning);
        assert!(received.persistent);
        assert_eq!(received.action.unwrap().intent, ActionIntent::OpenSignIn);
    }

    #[test]
    fn test_session_expired_action_is_not_a_router_request() {
        let value = serde_json::to_value(Notification::session_expired("Please sign in again.")).unwrap();
        assert_eq!(value["action"], serde_json::json!({ "label": "Sign in", "intent": "open_sign_in" }));
        let intent = value["action"]["intent"].as_str().unwrap();
        assert!(!crate::router::KNOWN_TYPES.contains(&intent));
    }

    #[tokio::test]
    async fn test_dismiss_and_clear() {
        let relay = NotificationRelay::new(Storage::in_memory());
        relay.warning("Heads up", "one").await.unwrap();
        relay.error("Failed", "two").await.unwrap();
        let id = relay.history().await.unwrap()[1].id.clone();

        assert!(relay.dismiss(&id).await.unwrap());
        assert!(!relay.dismiss(&id).await.unwrap());
        assert_eq!(relay.history().await.unwrap().len(), 1);

        relay.clear().await.unwrap();
        assert!(relay.history().await.unwrap().is_empty());
    }

    #[test]
    fn test_wire_shape() {
        let n = Notification::new(NotificationKind::Info, "t", "m");
        let value = serde_json::to_value(&n).unwrap();
        assert_eq!(value["type"], "info");
        assert!(value.get("action").is_none());
        assert_eq!(value["persistent"], false);
    }
}
