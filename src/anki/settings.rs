use serde_json::Value;

use crate::{
    core::{
        AnkiSettings,
        FieldMappings,
        Result,
        SyncError,
    },
    persistence::{
        keys,
        Storage,
        StorageArea,
    },
};

/// Everything a sync needs from the settings screen.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub anki: AnkiSettings,
    pub field_mappings: FieldMappings,
}

async fn non_blank(storage: &Storage, key: &str) -> Result<Option<String>> {
    Ok(storage
        .get_typed::<String>(StorageArea::Local, key)
        .await?
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

/// Reads the connection settings and field mappings. Any missing piece is
/// `NotConfigured`; this runs before any network call.
pub async fn load_sync_settings(storage: &Storage) -> Result<SyncSettings> {
    let url = non_blank(storage, keys::ANKI_CONNECT_URL).await;
    let deck = non_blank(storage, keys::ANKI_DECK).await;
    let note_type = non_blank(storage, keys::ANKI_NOTE_TYPE).await;
    let mappings = storage.get_typed::<FieldMappings>(StorageArea::Local, keys::FIELD_MAPPINGS).await;

    match (url, deck, note_type, mappings) {
        (Ok(Some(url)), Ok(Some(deck)), Ok(Some(note_type)), Ok(Some(field_mappings)))
            if !field_mappings.is_empty() =>
        {
            Ok(SyncSettings {
                anki: AnkiSettings { anki_connect_url: url, deck_name: deck, note_type },
                field_mappings,
            })
        }
        _ => Err(SyncError::NotConfigured),
    }
}

/// Endpoint for calls that do not need a deck, falling back to the default.
pub async fn anki_connect_url(storage: &Storage, default_url: &str) -> Result<String> {
    Ok(non_blank(storage, keys::ANKI_CONNECT_URL).await?.unwrap_or_else(|| default_url.to_string()))
}

pub async fn save_settings(storage: &Storage, settings: &AnkiSettings, mappings: &FieldMappings) -> Result<()> {
    storage.set(StorageArea::Local, keys::ANKI_CONNECT_URL, Value::from(settings.anki_connect_url.as_str())).await?;
    storage.set(StorageArea::Local, keys::ANKI_DECK, Value::from(settings.deck_name.as_str())).await?;
    storage.set(StorageArea::Local, keys::ANKI_NOTE_TYPE, Value::from(settings.note_type.as_str())).await?;
    storage.set_typed(StorageArea::Local, keys::FIELD_MAPPINGS, mappings).await
}

/// Whatever is stored, without requiring completeness.
pub async fn read_settings(storage: &Storage) -> Result<(Option<AnkiSettings>, FieldMappings)> {
    let mappings = storage
        .get_typed::<FieldMappings>(StorageArea::Local, keys::FIELD_MAPPINGS)
        .await
        .unwrap_or_default()
        .unwrap_or_default();

    let settings = match (
        non_blank(storage, keys::ANKI_CONNECT_URL).await?,
        non_blank(storage, keys::ANKI_DECK).await?,
        non_blank(storage, keys::ANKI_NOTE_TYPE).await?,
    ) {
        (Some(anki_connect_url), Some(deck_name), Some(note_type)) => {
            Some(AnkiSettings { anki_connect_url, deck_name, note_type })
        }
        _ => None,
    };
    Ok((settings, mappings))
}
