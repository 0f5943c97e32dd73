use std::collections::HashSet;

use base64::{
    engine::general_purpose::STANDARD,
    Engine as _,
};
use serde::Serialize;
use tracing::{
    debug,
    info,
    warn,
};

use crate::{
    anki::AnkiConnect,
    core::{
        Result,
        SyncError,
    },
    planner::{
        CardMediaPlan,
        MediaItem,
        PlannerClient,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Image,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Uploaded,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MediaCounts {
    pub uploaded: u32,
    pub skipped: u32,
    pub failed: u32,
}

impl MediaCounts {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Uploaded => self.uploaded += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MediaStats {
    pub audio: MediaCounts,
    pub images: MediaCounts,
}

impl MediaStats {
    fn counts_mut(&mut self, kind: MediaKind) -> &mut MediaCounts {
        match kind {
            MediaKind::Audio => &mut self.audio,
            MediaKind::Image => &mut self.images,
        }
    }

    pub fn total_failed(&self) -> u32 {
        self.audio.failed + self.images.failed
    }
}

/// Uploads media for one sync invocation. Items run strictly one after
/// another; `handled` lives exactly as long as the uploader.
pub struct MediaUploader<'a> {
    anki: &'a AnkiConnect,
    planner: &'a PlannerClient,
    token: Option<&'a str>,
    handled: HashSet<String>,
}

impl<'a> MediaUploader<'a> {
    pub fn new(anki: &'a AnkiConnect, planner: &'a PlannerClient, token: Option<&'a str>) -> Self {
        Self { anki, planner, token, handled: HashSet::new() }
    }

    pub async fn upload_all(&mut self, plans: &[CardMediaPlan]) -> Result<MediaStats> {
        let mut stats = MediaStats::default();
        for plan in plans {
            self.upload_card(plan, &mut stats).await?;
        }
        info!(
            audio_uploaded = stats.audio.uploaded,
            audio_skipped = stats.audio.skipped,
            image_uploaded = stats.images.uploaded,
            image_skipped = stats.images.skipped,
            failed = stats.total_failed(),
            "Media upload finished"
        );
        Ok(stats)
    }

    /// Audio first, then images, each in plan order.
    pub async fn upload_card(&mut self, plan: &CardMediaPlan, stats: &mut MediaStats) -> Result<()> {
        for item in &plan.audio {
            let outcome = self.upload_item(MediaKind::Audio, item).await?;
            stats.counts_mut(MediaKind::Audio).record(outcome);
        }
        for item in &plan.images {
            let outcome = self.upload_item(MediaKind::Image, item).await?;
            stats.counts_mut(MediaKind::Image).record(outcome);
        }
        Ok(())
    }

    /// Only an unreachable AnkiConnect comes back as `Err`.
    async fn upload_item(&mut self, kind: MediaKind, item: &MediaItem) -> Result<Outcome> {
        let filename = item.target_filename.as_str();
        if self.handled.contains(filename) {
            debug!(filename, "Already handled in this batch");
            return Ok(Outcome::Skipped);
        }

        let exists = match self.anki.media_file_exists(filename).await {
            Ok(exists) => exists,
            Err(SyncError::AnkiConnect(err)) => {
                warn!(filename, error = %err, "Media existence check failed, uploading anyway");
                false
            }
            Err(err) => return Err(err),
        };
        if exists {
            debug!(filename, "Media already in collection");
            self.handled.insert(filename.to_string());
            return Ok(Outcome::Skipped);
        }

        let data = match self.fetch(kind, item).await {
            Ok(bytes) => STANDARD.encode(bytes),
            Err(err) => {
                warn!(filename, field = %item.field_name, error = %err, "Media fetch failed");
                return Ok(Outcome::Failed);
            }
        };

        let response = self.anki.store_media_file(filename, &data).await?;
        match response.error {
            None => {
                debug!(filename, "Media stored");
                self.handled.insert(filename.to_string());
                Ok(Outcome::Uploaded)
            }
            Some(err) => {
                warn!(filename, error = %err, "storeMediaFile rejected");
                Ok(Outcome::Failed)
            }
        }
    }

    async fn fetch(&self, kind: MediaKind, item: &MediaItem) -> Result<Vec<u8>> {
        let url = match (kind, item.source_url.as_deref(), item.source_path.as_deref()) {
            (_, Some(url), _) if !url.trim().is_empty() => url.to_string(),
            (MediaKind::Audio, _, Some(path)) => self.planner.sign_media_path(path, self.token).await?,
            (MediaKind::Image, _, Some(path)) => self.planner.image_url(path),
            _ => {
                return Err(SyncError::MediaFetch(format!("no source for {}", item.target_filename)));
            }
        };
        self.planner.fetch_bytes(&url, self.token).await
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Client;
    use serde_json::json;
    use wiremock::{
        matchers::{
            body_partial_json,
            method,
            path,
        },
        Mock,
        MockServer,
        ResponseTemplate,
    };

    use super::*;
    use crate::core::CardId;

    fn audio(filename: &str, url: &str) -> MediaItem {
        MediaItem {
            field_name: "Audio".into(),
            source_url: Some(url.into()),
            source_path: None,
            target_filename: filename.into(),
        }
    }

    async fn anki_mock(server: &MockServer, existing: Vec<&str>) {
        Mock::given(method("POST"))
            .and(path("/anki"))
            .and(body_partial_json(json!({"action": "getMediaFilesNames"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": existing, "error": null})))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_existing_media_is_skipped_without_fetch() {
        let server = MockServer::start().await;
        anki_mock(&server, vec!["a.mp3"]).await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;

        let anki = AnkiConnect::new(Client::new(), format!("{}/anki", server.uri()));
        let planner = PlannerClient::new(Client::new(), server.uri());
        let mut uploader = MediaUploader::new(&anki, &planner, None);
        let plan = CardMediaPlan {
            card_id: CardId::Int(1),
            audio: vec![audio("a.mp3", &format!("{}/a.mp3", server.uri()))],
            images: vec![],
        };

        let stats = uploader.upload_all(&[plan]).await.unwrap();
        assert_eq!(stats.audio, MediaCounts { uploaded: 0, skipped: 1, failed: 0 });
    }

    #[tokio::test]
    async fn test_fetch_failure_counts_and_continues() {
        let server = MockServer::start().await;
        anki_mock(&server, vec![]).await;
        Mock::given(method("GET"))
            .and(path("/missing.mp3"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ok.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/anki"))
            .and(body_partial_json(json!({
                "action": "storeMediaFile",
                "params": {"filename": "ok.png", "data": "AQID"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "ok.png", "error": null})))
            .expect(1)
            .mount(&server)
            .await;

        let anki = AnkiConnect::new(Client::new(), format!("{}/anki", server.uri()));
        let planner = PlannerClient::new(Client::new(), server.uri());
        let mut uploader = MediaUploader::new(&anki, &planner, None);
        let plan = CardMediaPlan {
            card_id: CardId::Int(1),
            audio: vec![audio("missing.mp3", "/missing.mp3")],
            images: vec![MediaItem {
                field_name: "Picture".into(),
                source_url: Some("/ok.png".into()),
                source_path: None,
                target_filename: "ok.png".into(),
            }],
        };

        let stats = uploader.upload_all(&[plan]).await.unwrap();
        assert_eq!(stats.audio.failed, 1);
        assert_eq!(stats.images.uploaded, 1);
    }

    #[tokio::test]
    async fn test_unreachable_anki_is_structural() {
        let planner = PlannerClient::new(Client::new(), "http://127.0.0.1:9");
        let anki = AnkiConnect::new(Client::new(), "http://127.0.0.1:9");
        let mut uploader = MediaUploader::new(&anki, &planner, None);
        let plan = CardMediaPlan {
            card_id: CardId::Int(1),
            audio: vec![audio("a.mp3", "http://127.0.0.1:9/a.mp3")],
            images: vec![],
        };
        assert!(uploader.upload_all(&[plan]).await.is_err());
    }
}
