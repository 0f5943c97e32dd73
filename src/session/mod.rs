use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;
use tracing::debug;

use crate::{
    core::{
        utils::parse_timestamp,
        Result,
        SyncError,
    },
    persistence::{
        keys,
        Storage,
        StorageArea,
    },
};

pub mod validator;

pub use validator::{
    validate_session,
    SessionValidation,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user: Option<Value>,
}

impl SessionRecord {
    /// Validates the raw blob, then lifts it into a record. Anything the
    /// validator rejects never becomes a `SessionRecord`.
    pub fn decode(raw: &Value, now: DateTime<Utc>) -> Result<Self> {
        let validation = validate_session(raw, now);
        if !validation.is_valid {
            return Err(SyncError::auth(
                validation.reason.unwrap_or_else(|| validator::VALIDATION_ERROR.to_string()),
            ));
        }

        let text = |name| field(raw, name).and_then(Value::as_str).unwrap_or_default().to_string();

        Ok(Self {
            access_token: text("access_token"),
            refresh_token: text("refresh_token"),
            expires_at: field(raw, "expires_at").and_then(parse_timestamp),
            created_at: field(raw, "created_at").and_then(parse_timestamp),
            user: field(raw, "user").cloned(),
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }

    /// True when the access token should be refreshed before use.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        self.expires_at.map(|at| at - now <= margin).unwrap_or(false)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref()?.get("id")?.as_str()
    }
}

fn field<'a>(raw: &'a Value, name: &str) -> Option<&'a Value> {
    raw.get(name).filter(|v| !v.is_null())
}

/// Owns the `supabase_session` key. The session tier holds the hot copy, the
/// local tier the copy that survives restarts.
#[derive(Clone)]
pub struct SessionStore {
    storage: Storage,
}

impl SessionStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub async fn load_raw(&self) -> Result<Option<Value>> {
        for area in [StorageArea::Session, StorageArea::Local] {
            match self.storage.get(area, keys::SUPABASE_SESSION).await? {
                Some(Value::Null) | None => continue,
                Some(value) => return Ok(Some(value)),
            }
        }
        Ok(None)
    }

    pub async fn load_legacy_raw(&self) -> Result<Option<Value>> {
        Ok(self.storage.get(StorageArea::Local, keys::LEGACY_SESSION).await?.filter(|v| !v.is_null()))
    }

    pub async fn save(&self, session: &SessionRecord) -> Result<()> {
        let value = serde_json::to_value(session)?;
        self.storage.set(StorageArea::Session, keys::SUPABASE_SESSION, value.clone()).await?;
        self.storage.set(StorageArea::Local, keys::SUPABASE_SESSION, value).await?;
        debug!(user_id = session.user_id().unwrap_or("unknown"), "Session persisted");
        Ok(())
    }

    /// Full teardown: every credential key in both tiers.
    pub async fn clear(&self) -> Result<()> {
        self.storage.purge(keys::CREDENTIAL_KEYS).await
    }
}
