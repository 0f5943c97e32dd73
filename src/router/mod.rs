use std::{
    future::Future,
    sync::Arc,
};

use serde::Serialize;
use serde_json::{
    json,
    Map,
    Value,
};
use tokio::sync::oneshot;
use tracing::{
    debug,
    error,
    warn,
};

pub mod keepalive;
pub mod messages;

pub use keepalive::KeepAlive;
pub use messages::{
    validate,
    Rejection,
    Request,
    SenderContext,
    KNOWN_TYPES,
};

use crate::{
    anki::{
        check_connection,
        settings::{
            read_settings,
            save_settings,
        },
    },
    auth::{
        classifier::{
            is_session_invalid,
            user_message,
        },
        AuthOutcome,
    },
    context::AppContext,
    core::{
        AnkiSettings,
        Result,
        SyncError,
    },
    planner::SyncTarget,
};

pub type Responder = oneshot::Sender<Value>;

/// `{success: true, ..fields}` for a struct that serializes to an object.
fn success_with(value: impl Serialize) -> Value {
    let mut object = match serde_json::to_value(value) {
        Ok(Value::Object(object)) => object,
        Ok(other) => {
            let mut object = Map::new();
            object.insert("data".into(), other);
            object
        }
        Err(err) => return failure(&SyncError::Json(err)),
    };
    object.insert("success".into(), Value::Bool(true));
    Value::Object(object)
}

fn outcome<T: Serialize>(outcome: AuthOutcome<T>) -> Value {
    serde_json::to_value(outcome).unwrap_or_else(|e| failure(&SyncError::Json(e)))
}

/// Short, stable text for a failed handler. Transport detail stays in logs.
pub fn public_error(err: &SyncError) -> String {
    match err {
        SyncError::Reqwest(_) | SyncError::Io(_) | SyncError::WebSocket(_) => {
            "Network error. Please check your connection and try again.".to_string()
        }
        SyncError::Auth { .. } | SyncError::NotSignedIn if is_session_invalid(err) => {
            user_message(Some(err)).to_string()
        }
        _ => err.to_string(),
    }
}

fn failure(err: &SyncError) -> Value {
    json!({ "success": false, "error": public_error(err) })
}

/// Single dispatch point for every surface.
#[derive(Clone)]
pub struct Router {
    ctx: Arc<AppContext>,
}

impl Router {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// Always returns `true`: the response arrives later on `respond`,
    /// exactly once. Must be called inside a tokio runtime.
    pub fn handle(&self, message: Value, sender: SenderContext, respond: Responder) -> bool {
        let request = match validate(&message) {
            Ok(request) => request,
            Err(rejection) => {
                let rejected = message.get("type").cloned().unwrap_or_default();
                warn!(message_type = %rejected, "Rejected message");
                let _ = respond.send(rejection.into_response());
                return true;
            }
        };

        let kind = request.kind();
        debug!(message_type = kind, surface = sender.surface.as_deref().unwrap_or("unknown"), "Dispatching");

        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            let response = isolated(kind, dispatch(ctx, request)).await;
            if respond.send(response).is_err() {
                debug!(message_type = kind, "Requester went away before the response");
            }
        });
        true
    }

    /// Convenience for callers that want to await the response directly.
    pub async fn request(&self, message: Value, sender: SenderContext) -> Value {
        let (tx, rx) = oneshot::channel();
        self.handle(message, sender, tx);
        rx.await.unwrap_or_else(|_| json!({ "success": false, "error": "No response from handler" }))
    }
}

/// Runs a handler in its own task so a panic still produces a response.
async fn isolated<F>(kind: &'static str, handler: F) -> Value
where
    F: Future<Output = Value> + Send + 'static,
{
    match tokio::spawn(handler).await {
        Ok(response) => response,
        Err(join_err) => {
            let reason = if join_err.is_panic() {
                let payload = join_err.into_panic();
                payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
            } else {
                None
            };
            error!(message_type = kind, reason = reason.as_deref().unwrap_or("cancelled"), "Handler crashed");
            let error = match reason {
                Some(reason) => format!("{} handler failed: {}", kind, reason),
                None => format!("{} handler failed", kind),
            };
            json!({ "success": false, "error": error })
        }
    }
}

async fn dispatch(ctx: Arc<AppContext>, request: Request) -> Value {
    let kind = request.kind();
    match handle_request(&ctx, request).await {
        Ok(response) => response,
        Err(err) => {
            if is_session_invalid(&err) {
                warn!(message_type = kind, reason = user_message(Some(&err)), "Request failed on session");
            } else {
                error!(message_type = kind, error = %err, "Request failed");
            }
            failure(&err)
        }
    }
}

async fn handle_request(ctx: &AppContext, request: Request) -> Result<Value> {
    Ok(match request {
        Request::Ping => json!({ "success": true, "message": "PONG" }),
        Request::CheckAnkiConnection => {
            let status = check_connection(&ctx.anki().await?).await;
            let mut response = success_with(&status);
            response["success"] = Value::Bool(status.connected);
            response
        }
        Request::GetAnkiDecks => json!({ "success": true, "decks": ctx.anki().await?.deck_names().await? }),
        Request::GetAnkiModels => json!({ "success": true, "models": ctx.anki().await?.model_names().await? }),
        Request::GetAnkiModelFields { model_name } => {
            let fields = ctx.anki().await?.model_field_names(&model_name).await?;
            json!({ "success": true, "fields": fields })
        }
        Request::OpenAnkiNote { note_id } => {
            ctx.anki().await?.open_note(note_id).await?;
            json!({ "success": true })
        }
        Request::GetAnkiSettings => {
            let (settings, field_mappings) = read_settings(&ctx.storage).await?;
            json!({
                "success": true,
                "settings": settings,
                "fieldMappings": field_mappings,
                "defaultAnkiConnectUrl": ctx.config.default_anki_connect_url,
            })
        }
        Request::SaveAnkiSettings { anki_connect_url, deck_name, note_type, field_mappings } => {
            let settings = AnkiSettings { anki_connect_url, deck_name, note_type };
            save_settings(&ctx.storage, &settings, &field_mappings).await?;
            json!({ "success": true })
        }
        Request::SyncCards { card_ids } => {
            success_with(ctx.sync.plan_and_sync_new(SyncTarget::Cards(card_ids)).await?)
        }
        Request::SyncUnsyncedCards => success_with(ctx.sync.plan_and_sync_new(SyncTarget::AllUnsynced).await?),
        Request::UpdateCardFields { card_ids } => success_with(ctx.sync.plan_and_sync_updates(&card_ids).await?),
        Request::GetImport { import_id } => {
            json!({ "success": true, "data": ctx.sync.fetch_import(&import_id).await? })
        }
        Request::GetAuthState => success_with(ctx.auth.auth_state().await?),
        Request::SignIn { email, password } => outcome(ctx.auth.sign_in(&email, &password).await),
        Request::SetSession { session } => json!({ "success": true, "data": ctx.auth.set_session(&session).await? }),
        Request::RefreshSession => outcome(ctx.auth.refresh().await),
        Request::SignOut => {
            ctx.auth.sign_out().await?;
            json!({ "success": true })
        }
        Request::GetNotifications => json!({ "success": true, "notifications": ctx.notifications.history().await? }),
        Request::DismissNotification { id } => {
            json!({ "success": true, "dismissed": ctx.notifications.dismiss(&id).await? })
        }
        Request::ClearNotifications => {
            ctx.notifications.clear().await?;
            json!({ "success": true })
        }
    })
}
