use std::{
    collections::BTreeMap,
    path::{
        Path,
        PathBuf,
    },
    sync::Arc,
};

use async_trait::async_trait;
use serde::{
    de::DeserializeOwned,
    Serialize,
};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{
    debug,
    warn,
};

use crate::core::{
    Result,
    SyncError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageArea {
    /// Lives as long as the process.
    Session,
    /// Survives restarts.
    Local,
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
    async fn remove_many(&self, keys: &[&str]) -> Result<()>;
    async fn clear(&self) -> Result<()>;
    async fn keys(&self) -> Result<Vec<String>>;

    async fn remove(&self, key: &str) -> Result<()> {
        self.remove_many(&[key]).await
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let mut entries = self.entries.lock().await;
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.lock().await.clear();
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.lock().await.keys().cloned().collect())
    }
}

/// A single JSON object on disk, rewritten through a temp file on every
/// mutation so a crash never leaves a half-written store behind.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl FileStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(content) if !content.trim().is_empty() => {
                match serde_json::from_str::<BTreeMap<String, Value>>(&content) {
                    Ok(entries) => entries,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Store file unreadable, starting empty");
                        BTreeMap::new()
                    }
                }
            }
            Ok(_) => BTreeMap::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), keys = entries.len(), "Opened local store");
        Ok(Self { path, entries: Mutex::new(entries) })
    }

    async fn flush(&self, entries: &BTreeMap<String, Value>) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value);
        self.flush(&entries).await
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        for key in keys {
            entries.remove(*key);
        }
        if entries.len() != before {
            self.flush(&entries).await?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.clear();
        self.flush(&entries).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.lock().await.keys().cloned().collect())
    }
}

/// Both persistence tiers behind one handle.
#[derive(Clone)]
pub struct Storage {
    session: Arc<dyn KeyValueStore>,
    local: Arc<dyn KeyValueStore>,
}

impl Storage {
    pub fn new(session: Arc<dyn KeyValueStore>, local: Arc<dyn KeyValueStore>) -> Self {
        Self { session, local }
    }

    /// Both tiers in memory; nothing outlives the process.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    pub async fn open(local_path: impl AsRef<Path>) -> Result<Self> {
        let local = FileStore::open(local_path).await?;
        Ok(Self::new(Arc::new(MemoryStore::new()), Arc::new(local)))
    }

    pub fn area(&self, area: StorageArea) -> &Arc<dyn KeyValueStore> {
        match area {
            StorageArea::Session => &self.session,
            StorageArea::Local => &self.local,
        }
    }

    pub async fn get(&self, area: StorageArea, key: &str) -> Result<Option<Value>> {
        self.area(area).get(key).await
    }

    /// Missing or `null` decodes to `None`; anything that does not match `T`
    /// is an error rather than a best guess.
    pub async fn get_typed<T: DeserializeOwned>(
        &self,
        area: StorageArea,
        key: &str,
    ) -> Result<Option<T>> {
        match self.area(area).get(key).await? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| SyncError::Storage(format!("Malformed value for '{}': {}", key, e))),
        }
    }

    pub async fn set(&self, area: StorageArea, key: &str, value: Value) -> Result<()> {
        self.area(area).set(key, value).await
    }

    pub async fn set_typed<T: Serialize>(&self, area: StorageArea, key: &str, value: &T) -> Result<()> {
        self.area(area).set(key, serde_json::to_value(value)?).await
    }

    pub async fn remove(&self, area: StorageArea, key: &str) -> Result<()> {
        self.area(area).remove(key).await
    }

    /// Removes the keys from both tiers.
    pub async fn purge(&self, keys: &[&str]) -> Result<()> {
        self.session.remove_many(keys).await?;
        self.local.remove_many(keys).await
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.session.clear().await?;
        self.local.clear().await
    }
}
