use reqwest::Client;
use serde::{
    de::DeserializeOwned,
    Deserialize,
    Serialize,
};
use serde_json::{
    json,
    Value,
};
use tracing::debug;

use crate::core::{
    utils::escape_glob,
    Result,
    SyncError,
};

pub const ANKI_CONNECT_VERSION: u32 = 6;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub result: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// `error` is the only failure signal; HTTP 200 says nothing on its own.
    pub fn into_result(self) -> Result<Option<T>> {
        match self.error {
            Some(error) => Err(SyncError::AnkiConnect(error)),
            None => Ok(self.result),
        }
    }
}

/// A request the planner built for us, already in `{action, version, params}`
/// form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnkiRequest {
    pub action: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

fn default_version() -> u32 {
    ANKI_CONNECT_VERSION
}

impl AnkiRequest {
    pub fn new(action: &str, params: Option<Value>) -> Self {
        Self { action: action.to_string(), version: ANKI_CONNECT_VERSION, params }
    }
}

#[derive(Clone)]
pub struct AnkiConnect {
    client: Client,
    url: String,
}

impl AnkiConnect {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Transport failures come back as `Err`; logical failures are left in
    /// the envelope for the caller.
    pub async fn send<T: DeserializeOwned>(&self, request: &AnkiRequest) -> Result<ApiResponse<T>> {
        debug!(action = %request.action, "AnkiConnect request");
        let response: ApiResponse<T> =
            self.client.post(&self.url).json(request).send().await?.json().await?;
        Ok(response)
    }

    async fn make_request<T: DeserializeOwned>(&self, action: &str, params: Option<Value>) -> Result<Option<T>> {
        self.send::<T>(&AnkiRequest::new(action, params)).await?.into_result()
    }

    //Health check
    pub async fn version(&self) -> Result<u32> {
        Ok(self.make_request::<u32>("version", None).await?.unwrap_or_default())
    }

    pub async fn deck_names(&self) -> Result<Vec<String>> {
        Ok(self.make_request("deckNames", None).await?.unwrap_or_default())
    }

    pub async fn model_names(&self) -> Result<Vec<String>> {
        Ok(self.make_request("modelNames", None).await?.unwrap_or_default())
    }

    pub async fn model_field_names(&self, model_name: &str) -> Result<Vec<String>> {
        let params = json!({ "modelName": model_name });
        Ok(self.make_request("modelFieldNames", Some(params)).await?.unwrap_or_default())
    }

    pub async fn media_file_exists(&self, filename: &str) -> Result<bool> {
        let params = json!({ "pattern": escape_glob(filename) });
        let names: Vec<String> =
            self.make_request("getMediaFilesNames", Some(params)).await?.unwrap_or_default();
        Ok(names.iter().any(|name| name == filename))
    }

    /// `data` is base64. Returns the logical envelope so one bad file does
    /// not look like an unreachable Anki.
    pub async fn store_media_file(&self, filename: &str, data: &str) -> Result<ApiResponse<String>> {
        let params = json!({ "filename": filename, "data": data });
        self.send(&AnkiRequest::new("storeMediaFile", Some(params))).await
    }

    pub async fn add_notes(&self, request: &AnkiRequest) -> Result<ApiResponse<Vec<Option<i64>>>> {
        self.send(request).await
    }

    pub async fn update_note_fields(&self, request: &AnkiRequest) -> Result<ApiResponse<Value>> {
        self.invoke_raw(request).await
    }

    /// Planner-built request of any action, result left untyped.
    pub async fn invoke_raw(&self, request: &AnkiRequest) -> Result<ApiResponse<Value>> {
        self.send(request).await
    }

    /// One round trip for many actions. Each inner result keeps its own
    /// `{result, error}` envelope.
    pub async fn multi(&self, actions: &[AnkiRequest]) -> Result<Vec<ApiResponse<Value>>> {
        let params = json!({ "actions": actions });
        let results: Vec<Value> = self.make_request("multi", Some(params)).await?.unwrap_or_default();
        Ok(results
            .into_iter()
            .map(|value| {
                let is_envelope = value
                    .as_object()
                    .is_some_and(|o| o.contains_key("result") && o.contains_key("error"));
                if !is_envelope {
                    // older AnkiConnect versions return bare results
                    return ApiResponse { result: Some(value), error: None };
                }
                serde_json::from_value(value).unwrap_or_else(|e| ApiResponse {
                    result: None,
                    error: Some(format!("Malformed multi result: {}", e)),
                })
            })
            .collect())
    }

    pub async fn gui_browse(&self, query: &str) -> Result<Vec<i64>> {
        let params = json!({ "query": query });
        Ok(self.make_request("guiBrowse", Some(params)).await?.unwrap_or_default())
    }

    pub async fn open_note(&self, note_id: i64) -> Result<Vec<i64>> {
        self.gui_browse(&format!("nid:{}", note_id)).await
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        matchers::{
            body_json,
            method,
        },
        Mock,
        MockServer,
        ResponseTemplate,
    };

    use super::*;

    #[tokio::test]
    async fn test_logical_error_is_failure_despite_http_200() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({"action": "deckNames", "version": 6})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": null, "error": "collection is not available"})),
            )
            .mount(&server)
            .await;

        let anki = AnkiConnect::new(Client::new(), server.uri());
        let err = anki.deck_names().await.unwrap_err();
        assert_eq!(err.to_string(), "AnkiConnect error: collection is not available");
    }

    #[tokio::test]
    async fn test_media_exists_matches_exact_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({
                "action": "getMediaFilesNames",
                "version": 6,
                "params": {"pattern": "clip[*].mp3"}
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"result": ["clip*.mp3"], "error": null})),
            )
            .mount(&server)
            .await;

        let anki = AnkiConnect::new(Client::new(), server.uri());
        assert!(anki.media_file_exists("clip*.mp3").await.unwrap());
    }

    #[tokio::test]
    async fn test_multi_unwraps_envelopes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [{"result": null, "error": null}, {"result": null, "error": "note was not found: 7"}],
                "error": null
            })))
            .mount(&server)
            .await;

        let anki = AnkiConnect::new(Client::new(), server.uri());
        let results = anki
            .multi(&[
                AnkiRequest::new("updateNoteFields", Some(json!({"note": {"id": 1, "fields": {}}}))),
                AnkiRequest::new("updateNoteFields", Some(json!({"note": {"id": 7, "fields": {}}}))),
            ])
            .await
            .unwrap();
        assert!(results[0].error.is_none());
        assert_eq!(results[1].error.as_deref(), Some("note was not found: 7"));
    }
}
