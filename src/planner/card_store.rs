use chrono::{
    DateTime,
    Utc,
};
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::core::{
    http::{
        ensure_success,
        join_url,
        with_bearer,
    },
    CardId,
    Result,
    SyncError,
    SyncStatus,
};

const CARDS_TABLE: &str = "rest/v1/user_cards";

/// Columns written after a note is created. Only these are sent, so a
/// PATCH never nulls anything else on the row.
#[derive(Debug, Clone, Serialize)]
pub struct SyncedCardPatch {
    pub sync_status: SyncStatus,
    pub synced_at: DateTime<Utc>,
    pub anki_note_id: i64,
    pub anki_model: String,
    pub anki_deck: String,
}

/// PostgREST view of the user's cards on the Supabase project.
#[derive(Clone)]
pub struct CardStore {
    client: Client,
    url: String,
    anon_key: String,
}

impl CardStore {
    pub fn new(client: Client, url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self { client, url: url.into(), anon_key: anon_key.into() }
    }

    fn patch(&self, filter: String, token: Option<&str>) -> reqwest::RequestBuilder {
        let url = join_url(&self.url, CARDS_TABLE);
        let token = token.unwrap_or(&self.anon_key);
        with_bearer(self.client.patch(url), Some(token))
            .header("apikey", &self.anon_key)
            .header("Prefer", "return=minimal")
            .query(&[("id", filter)])
    }

    pub async fn mark_synced(&self, card_id: &CardId, patch: &SyncedCardPatch, token: Option<&str>) -> Result<()> {
        let resp = self.patch(format!("eq.{}", card_id), token).json(patch).send().await?;
        ensure_success(resp, |_, body| SyncError::CardStore(body)).await?;
        debug!(%card_id, note_id = patch.anki_note_id, "Card marked as pushed");
        Ok(())
    }

    /// Bumps `synced_at` for every id in one call.
    pub async fn touch_synced(&self, card_ids: &[CardId], at: DateTime<Utc>, token: Option<&str>) -> Result<()> {
        if card_ids.is_empty() {
            return Ok(());
        }

        let list = card_ids
            .iter()
            .map(|id| match id {
                CardId::Int(n) => n.to_string(),
                CardId::Text(s) => format!("\"{}\"", s.replace('"', "\\\"")),
            })
            .collect::<Vec<_>>()
            .join(",");

        let resp = self
            .patch(format!("in.({})", list), token)
            .json(&json!({ "synced_at": at }))
            .send()
            .await?;
        ensure_success(resp, |_, body| SyncError::CardStore(body)).await?;
        debug!(count = card_ids.len(), "Bulk synced_at update");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        matchers::{
            body_json,
            header,
            method,
            path,
            query_param,
        },
        Mock,
        MockServer,
        ResponseTemplate,
    };

    use super::*;

    #[tokio::test]
    async fn test_mark_synced_sends_only_sync_columns() {
        let server = MockServer::start().await;
        let at = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z").unwrap().with_timezone(&Utc);
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/user_cards"))
            .and(query_param("id", "eq.2"))
            .and(header("apikey", "anon"))
            .and(header("authorization", "Bearer user-token"))
            .and(body_json(json!({
                "sync_status": "pushed",
                "synced_at": "2024-05-01T10:00:00Z",
                "anki_note_id": 1700,
                "anki_model": "Lapis",
                "anki_deck": "Mining"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let store = CardStore::new(Client::new(), server.uri(), "anon");
        let patch = SyncedCardPatch {
            sync_status: SyncStatus::Pushed,
            synced_at: at,
            anki_note_id: 1700,
            anki_model: "Lapis".into(),
            anki_deck: "Mining".into(),
        };
        store.mark_synced(&CardId::Int(2), &patch, Some("user-token")).await.unwrap();
    }

    #[tokio::test]
    async fn test_touch_synced_uses_in_filter_and_anon_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(query_param("id", "in.(1,\"b\")"))
            .and(header("authorization", "Bearer anon"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let store = CardStore::new(Client::new(), server.uri(), "anon");
        store.touch_synced(&[CardId::Int(1), CardId::from("b")], Utc::now(), None).await.unwrap();
    }

    #[tokio::test]
    async fn test_touch_synced_skips_empty_list() {
        let store = CardStore::new(Client::new(), "http://127.0.0.1:9", "anon");
        assert!(store.touch_synced(&[], Utc::now(), None).await.is_ok());
    }
}
