use std::{
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};

use serde::{
    Deserialize,
    Serialize,
};

use crate::persistence::{
    get_app_data_dir,
    load_json_or_default,
};

pub const CONFIG_FILE: &str = "config.json";
pub const LOCAL_STORE_FILE: &str = "local_store.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 1000 }
    }
}

impl RetryPolicy {
    /// Delay slept after a failed `attempt` (1-based): base * 2^(attempt-1).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStrategy {
    /// One card per AnkiConnect call, each after its own media plan.
    #[default]
    Sequential,
    /// All media first, then a single `multi` call.
    Batched,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub listen_addr: String,
    pub planner_url: String,
    pub default_anki_connect_url: String,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub retry: RetryPolicy,
    pub update_strategy: UpdateStrategy,
    pub http_timeout_secs: u64,
    pub data_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8767".to_string(),
            planner_url: "http://localhost:3000".to_string(),
            default_anki_connect_url: "http://127.0.0.1:8765".to_string(),
            supabase_url: None,
            supabase_anon_key: None,
            retry: RetryPolicy::default(),
            update_strategy: UpdateStrategy::default(),
            http_timeout_secs: 60,
            data_dir: None,
        }
    }
}

impl AppConfig {
    /// Reads `path` (or `config.json` in the app data dir), then applies
    /// environment overrides. A missing or broken file yields defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.map(Path::to_path_buf).unwrap_or_else(|| get_app_data_dir().join(CONFIG_FILE));
        let mut config: AppConfig = load_json_or_default(&path);
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = var("ANKISYNC_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Some(url) = var("ANKISYNC_PLANNER_URL") {
            self.planner_url = url;
        }
        if let Some(dir) = var("ANKISYNC_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(get_app_data_dir)
    }

    pub fn local_store_path(&self) -> PathBuf {
        self.data_dir().join(LOCAL_STORE_FILE)
    }
}
