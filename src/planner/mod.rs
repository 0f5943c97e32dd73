use reqwest::{
    Client,
    Url,
};
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::{
    json,
    Value,
};
use tracing::{
    debug,
    info,
};

pub mod card_store;

pub use card_store::CardStore;

use crate::{
    anki::AnkiRequest,
    core::{
        http::{
            ensure_success,
            join_url,
            with_bearer,
        },
        AnkiSettings,
        CardId,
        FieldMappings,
        Result,
        SyncError,
    },
};

/// One asset a note field references. Exactly one of `source_url` /
/// `source_path` is expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub field_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    pub target_filename: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardMediaPlan {
    pub card_id: CardId,
    #[serde(default)]
    pub audio: Vec<MediaItem>,
    #[serde(default)]
    pub images: Vec<MediaItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCardsPlan {
    pub add_notes_request: AnkiRequest,
    #[serde(default)]
    pub media_plans: Vec<CardMediaPlan>,
    /// Card id per note in `add_notes_request`, same order.
    #[serde(default)]
    pub card_ids: Vec<CardId>,
}

impl NewCardsPlan {
    pub fn note_card_ids(&self) -> Vec<CardId> {
        if self.card_ids.is_empty() {
            self.media_plans.iter().map(|p| p.card_id.clone()).collect()
        } else {
            self.card_ids.clone()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlanEntry {
    pub card_id: CardId,
    #[serde(default)]
    pub note_id: Option<i64>,
    pub request: AnkiRequest,
    #[serde(default)]
    pub audio: Vec<MediaItem>,
    #[serde(default)]
    pub images: Vec<MediaItem>,
}

impl UpdatePlanEntry {
    pub fn media_plan(&self) -> CardMediaPlan {
        CardMediaPlan { card_id: self.card_id.clone(), audio: self.audio.clone(), images: self.images.clone() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedCard {
    pub card_id: CardId,
    /// Machine readable, e.g. `not_pushed`.
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatesPlan {
    #[serde(default)]
    pub requests: Vec<UpdatePlanEntry>,
    #[serde(default)]
    pub skipped_cards: Vec<SkippedCard>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncTarget {
    Cards(Vec<CardId>),
    /// Every card of the signed-in user still marked `local_only`.
    AllUnsynced,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanRequest<'a> {
    anki_settings: &'a AnkiSettings,
    field_mappings: &'a FieldMappings,
    #[serde(skip_serializing_if = "Option::is_none")]
    card_ids: Option<&'a [CardId]>,
    sync_unsynced: bool,
}

/// The remote service that turns card records into note and media plans.
/// Planning failures are not transient, so nothing here retries.
#[derive(Clone)]
pub struct PlannerClient {
    client: Client,
    base_url: String,
}

impl PlannerClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into() }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for planner-relative paths such as `/media/x.mp3`.
    pub fn resolve(&self, url_or_path: &str) -> String {
        if url_or_path.starts_with("http://") || url_or_path.starts_with("https://") {
            url_or_path.to_string()
        } else {
            join_url(&self.base_url, url_or_path)
        }
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &impl Serialize,
        token: Option<&str>,
    ) -> Result<T> {
        let url = join_url(&self.base_url, path);
        let resp = with_bearer(self.client.post(&url), token).json(body).send().await?;
        let resp = ensure_success(resp, |_, body| SyncError::Planner(body)).await?;
        Ok(resp.json().await?)
    }

    pub async fn plan_new_cards(
        &self,
        settings: &AnkiSettings,
        mappings: &FieldMappings,
        target: &SyncTarget,
        token: Option<&str>,
    ) -> Result<NewCardsPlan> {
        let body = PlanRequest {
            anki_settings: settings,
            field_mappings: mappings,
            card_ids: match target {
                SyncTarget::Cards(ids) => Some(ids.as_slice()),
                SyncTarget::AllUnsynced => None,
            },
            sync_unsynced: matches!(target, SyncTarget::AllUnsynced),
        };

        let plan: NewCardsPlan = self.post_json("api/anki/plan", &body, token).await?;
        info!(notes = plan.note_card_ids().len(), media_plans = plan.media_plans.len(), "Received sync plan");
        Ok(plan)
    }

    pub async fn plan_updates(
        &self,
        settings: &AnkiSettings,
        mappings: &FieldMappings,
        card_ids: &[CardId],
        token: Option<&str>,
    ) -> Result<UpdatesPlan> {
        let body = PlanRequest {
            anki_settings: settings,
            field_mappings: mappings,
            card_ids: Some(card_ids),
            sync_unsynced: false,
        };

        let plan: UpdatesPlan = self.post_json("api/anki/plan-updates", &body, token).await?;
        info!(requests = plan.requests.len(), skipped = plan.skipped_cards.len(), "Received update plan");
        Ok(plan)
    }

    /// A previously completed import/plan, passed through untouched.
    pub async fn fetch_import(&self, import_id: &str, token: Option<&str>) -> Result<Value> {
        let url = join_url(&self.base_url, &format!("api/anki/imports/{}", import_id));
        let resp = with_bearer(self.client.get(&url), token).send().await?;
        let resp = ensure_success(resp, |_, body| SyncError::Planner(body)).await?;
        Ok(resp.json().await?)
    }

    /// Short-lived URL for an audio file that only exists as a server path.
    pub async fn sign_media_path(&self, path: &str, token: Option<&str>) -> Result<String> {
        #[derive(Deserialize)]
        struct Signed {
            url: String,
        }

        let signed: Signed = self.post_json("api/media/sign", &json!({ "path": path }), token).await?;
        debug!(path, "Signed media path");
        Ok(self.resolve(&signed.url))
    }

    /// Image location for a planner-hosted `sourcePath`.
    pub fn image_url(&self, path: &str) -> String {
        join_url(&self.base_url, &format!("api/images/{}", path.trim_start_matches('/')))
    }

    /// Same scheme, host and port as the planner.
    pub fn is_planner_origin(&self, url: &str) -> bool {
        match (Url::parse(&self.base_url), Url::parse(url)) {
            (Ok(base), Ok(target)) => base.origin() == target.origin(),
            _ => false,
        }
    }

    /// The bearer token only goes to the planner's own origin.
    pub async fn fetch_bytes(&self, url: &str, token: Option<&str>) -> Result<Vec<u8>> {
        let url = self.resolve(url);
        let token = token.filter(|_| self.is_planner_origin(&url));
        let resp = with_bearer(self.client.get(&url), token).send().await?;
        let resp = ensure_success(resp, |status, _| {
            SyncError::MediaFetch(format!("HTTP {} from {}", status, url))
        })
        .await?;
        Ok(resp.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        matchers::{
            body_partial_json,
            header,
            method,
            path,
        },
        Mock,
        MockServer,
        ResponseTemplate,
    };

    use super::*;

    fn settings() -> AnkiSettings {
        AnkiSettings {
            anki_connect_url: "http://127.0.0.1:8765".into(),
            deck_name: "Mining".into(),
            note_type: "Lapis".into(),
        }
    }

    #[tokio::test]
    async fn test_plan_request_shape_and_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/anki/plan"))
            .and(header("authorization", "Bearer tok"))
            .and(body_partial_json(json!({
                "ankiSettings": {"deckName": "Mining", "noteType": "Lapis"},
                "cardIds": [1, 2],
                "syncUnsynced": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "addNotesRequest": {"action": "addNotes", "version": 6, "params": {"notes": []}},
                "mediaPlans": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let planner = PlannerClient::new(Client::new(), server.uri());
        let mappings = FieldMappings::new();
        let plan = planner
            .plan_new_cards(&settings(), &mappings, &SyncTarget::Cards(vec![1.into(), 2.into()]), Some("tok"))
            .await
            .unwrap();
        assert_eq!(plan.add_notes_request.action, "addNotes");
        assert!(plan.note_card_ids().is_empty());
    }

    #[tokio::test]
    async fn test_non_2xx_surfaces_body_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/anki/plan-updates"))
            .respond_with(ResponseTemplate::new(422).set_body_string("No cards found for user"))
            .mount(&server)
            .await;

        let planner = PlannerClient::new(Client::new(), server.uri());
        let err = planner
            .plan_updates(&settings(), &FieldMappings::new(), &[CardId::Int(9)], None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No cards found for user");
    }

    #[test]
    fn test_resolve_relative_urls() {
        let planner = PlannerClient::new(Client::new(), "https://planner.test/");
        assert_eq!(planner.resolve("/media/a.mp3"), "https://planner.test/media/a.mp3");
        assert_eq!(planner.resolve("https://cdn.test/a.mp3"), "https://cdn.test/a.mp3");
    }

    #[test]
    fn test_planner_origin_is_exact() {
        let planner = PlannerClient::new(Client::new(), "http://127.0.0.1:3948");
        assert!(planner.is_planner_origin("http://127.0.0.1:3948/api/images/a.png"));
        assert!(!planner.is_planner_origin("http://127.0.0.1:39487/img.png"));
        assert!(!planner.is_planner_origin("https://127.0.0.1:3948/img.png"));

        let planner = PlannerClient::new(Client::new(), "https://planner.test/");
        assert!(planner.is_planner_origin("https://planner.test/media/a.mp3"));
        assert!(!planner.is_planner_origin("https://planner.test.evil.com/a.mp3"));
        assert!(!planner.is_planner_origin("not a url"));
    }

    #[tokio::test]
    async fn test_foreign_media_host_gets_no_token() {
        let planner_server = MockServer::start().await;
        let media_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img.png"))
            .and(header("authorization", "Bearer secret-user-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("leaked"))
            .mount(&media_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/img.png"))
            .respond_with(ResponseTemplate::new(200).set_body_string("public"))
            .mount(&media_server)
            .await;

        let planner = PlannerClient::new(Client::new(), planner_server.uri());
        let bytes = planner
            .fetch_bytes(&format!("{}/img.png", media_server.uri()), Some("secret-user-token"))
            .await
            .unwrap();
        assert_eq!(bytes, b"public");
    }

    #[tokio::test]
    async fn test_planner_media_gets_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/images/a.png"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("img"))
            .mount(&server)
            .await;

        let planner = PlannerClient::new(Client::new(), server.uri());
        let bytes = planner.fetch_bytes(&planner.image_url("a.png"), Some("tok")).await.unwrap();
        assert_eq!(bytes, b"img");
    }
}
