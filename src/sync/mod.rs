use std::sync::Arc;

use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{
    debug,
    error,
    info,
    warn,
};

pub mod media;

pub use media::{
    MediaCounts,
    MediaStats,
    MediaUploader,
};

use crate::{
    anki::{
        load_sync_settings,
        AnkiConnect,
        ApiResponse,
        SyncSettings,
    },
    auth::AuthManager,
    config::UpdateStrategy,
    core::{
        CardId,
        Result,
        SyncError,
        SyncStatus,
    },
    notifications::NotificationRelay,
    persistence::Storage,
    planner::{
        card_store::SyncedCardPatch,
        CardStore,
        NewCardsPlan,
        PlannerClient,
        SkippedCard,
        SyncTarget,
        UpdatePlanEntry,
    },
};

const NOTE_NOT_CREATED: &str = "Note could not be created";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_id: Option<CardId>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Partial failures still report `success: true`; callers read `results`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncNewResult {
    pub success: bool,
    pub results: Vec<NoteResult>,
    pub media_stats: MediaStats,
}

impl SyncNewResult {
    pub fn created(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub card_id: CardId,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncUpdatesResult {
    pub success: bool,
    pub results: Vec<UpdateResult>,
    pub skipped_cards: Vec<SkippedCard>,
    pub media_stats: MediaStats,
}

/// Per-index outcome of an `addNotes` call. An error with no result list
/// fails every note with that message.
fn note_results(response: ApiResponse<Vec<Option<i64>>>, card_ids: &[CardId], expected: usize) -> Vec<NoteResult> {
    let ApiResponse { result, error } = response;
    let count = result.as_ref().map_or(expected, Vec::len).max(expected);
    let ids = result.unwrap_or_default();

    (0..count)
        .map(|index| {
            let card_id = card_ids.get(index).cloned();
            match ids.get(index).copied().flatten() {
                Some(note_id) => NoteResult { card_id, success: true, note_id: Some(note_id), error: None },
                None => NoteResult {
                    card_id,
                    success: false,
                    note_id: None,
                    error: Some(error.clone().unwrap_or_else(|| NOTE_NOT_CREATED.to_string())),
                },
            }
        })
        .collect()
}

fn note_count(plan: &NewCardsPlan) -> usize {
    plan.add_notes_request
        .params
        .as_ref()
        .and_then(|p| p.get("notes"))
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

fn update_result(card_id: &CardId, outcome: Result<ApiResponse<Value>>) -> UpdateResult {
    let error = match outcome {
        Ok(ApiResponse { error: None, .. }) => None,
        Ok(ApiResponse { error: Some(err), .. }) => Some(err),
        Err(err) => Some(err.to_string()),
    };
    if let Some(err) = &error {
        warn!(%card_id, error = %err, "Note update failed");
    }
    UpdateResult { card_id: card_id.clone(), success: error.is_none(), error }
}

/// Results for cards never attempted because the run stopped early.
fn abandoned(entries: &[UpdatePlanEntry], err: &SyncError) -> Vec<UpdateResult> {
    error!(remaining = entries.len(), error = %err, "Update run stopped");
    let message = err.to_string();
    entries
        .iter()
        .map(|entry| UpdateResult { card_id: entry.card_id.clone(), success: false, error: Some(message.clone()) })
        .collect()
}

/// Planner round trip, media upload and note submission for both sync
/// flows.
pub struct SyncService {
    client: Client,
    storage: Storage,
    planner: PlannerClient,
    card_store: Option<CardStore>,
    auth: Arc<AuthManager>,
    notifications: Arc<NotificationRelay>,
    strategy: UpdateStrategy,
}

impl SyncService {
    pub fn new(
        client: Client,
        storage: Storage,
        planner: PlannerClient,
        card_store: Option<CardStore>,
        auth: Arc<AuthManager>,
        notifications: Arc<NotificationRelay>,
        strategy: UpdateStrategy,
    ) -> Self {
        Self { client, storage, planner, card_store, auth, notifications, strategy }
    }

    /// Auth is optional here: no session just means an unauthenticated plan.
    async fn bearer(&self) -> Option<String> {
        match self.auth.access_token().await {
            Ok(token) => Some(token),
            Err(err) => {
                debug!(reason = %err, "Planning without a bearer token");
                None
            }
        }
    }

    fn anki_for(&self, settings: &SyncSettings) -> AnkiConnect {
        AnkiConnect::new(self.client.clone(), settings.anki.anki_connect_url.clone())
    }

    pub async fn plan_and_sync_new(&self, target: SyncTarget) -> Result<SyncNewResult> {
        let settings = load_sync_settings(&self.storage).await?;
        let token = self.bearer().await;
        let token = token.as_deref();

        let plan = self
            .planner
            .plan_new_cards(&settings.anki, &settings.field_mappings, &target, token)
            .await?;

        let anki = self.anki_for(&settings);
        let media_stats = MediaUploader::new(&anki, &self.planner, token).upload_all(&plan.media_plans).await?;

        let response = anki.add_notes(&plan.add_notes_request).await?;
        let card_ids = plan.note_card_ids();
        let results = note_results(response, &card_ids, note_count(&plan));

        for result in results.iter().filter(|r| r.success) {
            if let (Some(card_id), Some(note_id)) = (&result.card_id, result.note_id) {
                self.write_back(card_id, note_id, &settings, token).await;
            }
        }

        let outcome = SyncNewResult { success: true, results, media_stats };
        let created = outcome.created();
        info!(created, total = outcome.results.len(), "Sync finished");
        if created > 0 {
            let message = format!("{} card(s) added to Anki", created);
            if let Err(err) = self.notifications.success("Sync complete", message).await {
                warn!(error = %err, "Failed to record sync notification");
            }
        }
        Ok(outcome)
    }

    /// Write-back failures are logged; the note already exists in Anki.
    async fn write_back(&self, card_id: &CardId, note_id: i64, settings: &SyncSettings, token: Option<&str>) {
        let Some(store) = &self.card_store else {
            warn!(%card_id, "No card store configured, skipping write-back");
            return;
        };

        let patch = SyncedCardPatch {
            sync_status: SyncStatus::Pushed,
            synced_at: Utc::now(),
            anki_note_id: note_id,
            anki_model: settings.anki.note_type.clone(),
            anki_deck: settings.anki.deck_name.clone(),
        };
        if let Err(err) = store.mark_synced(card_id, &patch, token).await {
            error!(%card_id, error = %err, "Failed to write sync metadata");
        }
    }

    pub async fn plan_and_sync_updates(&self, card_ids: &[CardId]) -> Result<SyncUpdatesResult> {
        let settings = load_sync_settings(&self.storage).await?;
        let token = self.bearer().await;
        let token = token.as_deref();

        let plan = self
            .planner
            .plan_updates(&settings.anki, &settings.field_mappings, card_ids, token)
            .await?;
        for skipped in &plan.skipped_cards {
            debug!(card_id = %skipped.card_id, reason = %skipped.reason, "Planner skipped card");
        }

        let anki = self.anki_for(&settings);
        let mut uploader = MediaUploader::new(&anki, &self.planner, token);
        let mut media_stats = MediaStats::default();

        // a structural failure stops the run; cards already updated keep
        // their results and the rest record the error
        let results = match self.strategy {
            UpdateStrategy::Sequential => {
                let mut results = Vec::with_capacity(plan.requests.len());
                for (index, entry) in plan.requests.iter().enumerate() {
                    if let Err(err) = uploader.upload_card(&entry.media_plan(), &mut media_stats).await {
                        results.extend(abandoned(&plan.requests[index..], &err));
                        break;
                    }
                    let outcome = anki.update_note_fields(&entry.request).await;
                    results.push(update_result(&entry.card_id, outcome));
                }
                results
            }
            UpdateStrategy::Batched => {
                let mut prepared = plan.requests.len();
                let mut failure = None;
                for (index, entry) in plan.requests.iter().enumerate() {
                    if let Err(err) = uploader.upload_card(&entry.media_plan(), &mut media_stats).await {
                        prepared = index;
                        failure = Some(err);
                        break;
                    }
                }
                let mut results = self.run_batched(&anki, &plan.requests[..prepared]).await;
                if let Some(err) = failure {
                    results.extend(abandoned(&plan.requests[prepared..], &err));
                }
                results
            }
        };

        let updated: Vec<CardId> = results.iter().filter(|r| r.success).map(|r| r.card_id.clone()).collect();
        if let Some(store) = &self.card_store {
            if let Err(err) = store.touch_synced(&updated, Utc::now(), token).await {
                warn!(count = updated.len(), error = %err, "Bulk synced_at update failed");
            }
        }

        info!(updated = updated.len(), skipped = plan.skipped_cards.len(), "Update sync finished");
        Ok(SyncUpdatesResult { success: true, results, skipped_cards: plan.skipped_cards, media_stats })
    }

    async fn run_batched(&self, anki: &AnkiConnect, entries: &[UpdatePlanEntry]) -> Vec<UpdateResult> {
        if entries.is_empty() {
            return Vec::new();
        }
        let requests: Vec<_> = entries.iter().map(|e| e.request.clone()).collect();
        match anki.multi(&requests).await {
            Ok(responses) => {
                let mut responses = responses.into_iter();
                entries
                    .iter()
                    .map(|entry| {
                        let outcome = responses.next().ok_or_else(|| {
                            SyncError::AnkiConnect("missing multi result".into())
                        });
                        update_result(&entry.card_id, outcome)
                    })
                    .collect()
            }
            Err(err) => {
                let message = err.to_string();
                entries
                    .iter()
                    .map(|entry| update_result(&entry.card_id, Err(SyncError::Custom(message.clone()))))
                    .collect()
            }
        }
    }

    pub async fn fetch_import(&self, import_id: &str) -> Result<Value> {
        let token = self.bearer().await;
        self.planner.fetch_import(import_id, token.as_deref()).await
    }
}
