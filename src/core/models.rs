use std::fmt;

use serde::{
    Deserialize,
    Serialize,
};

/// Opaque card identifier from the remote card database. The web app hands
/// out numeric ids today but nothing here depends on that.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CardId {
    Int(i64),
    Text(String),
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardId::Int(id) => write!(f, "{}", id),
            CardId::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for CardId {
    fn from(id: i64) -> Self {
        CardId::Int(id)
    }
}

impl From<&str> for CardId {
    fn from(id: &str) -> Self {
        CardId::Text(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    LocalOnly,
    Pushed,
}

/// Connection settings the settings screen writes into the local tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnkiSettings {
    pub anki_connect_url: String,
    pub deck_name: String,
    pub note_type: String,
}

/// Field mapping configuration: card attribute (expression, reading,
/// definition, audio, image, ...) to note-type field name.
pub type FieldMappings = std::collections::BTreeMap<String, String>;
