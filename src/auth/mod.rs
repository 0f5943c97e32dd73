use std::sync::Arc;

use chrono::{
    DateTime,
    Duration,
    Utc,
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{
    debug,
    info,
    warn,
};

pub mod classifier;
pub mod provider;
pub mod retry;

pub use classifier::{
    classify,
    user_message,
    AuthErrorKind,
};
pub use provider::{
    AuthProvider,
    SupabaseAuth,
};
pub use retry::{
    retry_with_backoff,
    AuthOutcome,
    SafeAuthOptions,
    SessionRecovery,
};

use crate::{
    core::{
        Result,
        SyncError,
    },
    notifications::NotificationRelay,
    router::keepalive::KeepAlive,
    session::{
        SessionRecord,
        SessionStore,
    },
};

/// Tokens expiring within this window are refreshed before use.
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    pub signed_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthState {
    fn signed_out() -> Self {
        Self { signed_in: false, user: None, expires_at: None }
    }

    fn from_session(session: &SessionRecord) -> Self {
        Self { signed_in: true, user: session.user.clone(), expires_at: session.expires_at }
    }
}

pub struct AuthManager {
    provider: Option<Arc<dyn AuthProvider>>,
    sessions: SessionStore,
    recovery: SessionRecovery,
    notifications: Arc<NotificationRelay>,
    keepalive: Arc<KeepAlive>,
    refresh_lock: Mutex<()>,
}

impl AuthManager {
    pub fn new(
        provider: Option<Arc<dyn AuthProvider>>,
        sessions: SessionStore,
        recovery: SessionRecovery,
        notifications: Arc<NotificationRelay>,
        keepalive: Arc<KeepAlive>,
    ) -> Self {
        Self { provider, sessions, recovery, notifications, keepalive, refresh_lock: Mutex::new(()) }
    }

    /// False when no identity provider is configured; session restoration
    /// then falls back to the legacy key.
    pub fn is_available(&self) -> bool {
        self.provider.is_some()
    }

    pub fn recovery(&self) -> &SessionRecovery {
        &self.recovery
    }

    fn provider(&self) -> Result<&Arc<dyn AuthProvider>> {
        self.provider.as_ref().ok_or_else(|| SyncError::Custom("Authentication is not configured".into()))
    }

    /// The persisted session if it passes validation. An invalid blob is torn
    /// down on the spot.
    pub async fn current_session(&self) -> Result<Option<SessionRecord>> {
        let Some(raw) = self.sessions.load_raw().await? else {
            return Ok(None);
        };

        match SessionRecord::decode(&raw, Utc::now()) {
            Ok(session) => Ok(Some(session)),
            Err(err) => {
                warn!(reason = %err, "Stored session rejected");
                self.recovery.teardown(classifier::MSG_SESSION_EXPIRED).await?;
                Ok(None)
            }
        }
    }

    /// Startup path: load, validate and refresh an expired session.
    pub async fn restore_session(&self) -> Result<Option<SessionRecord>> {
        let Some(session) = self.current_session().await? else {
            debug!("No session to restore");
            return Ok(None);
        };

        if !session.is_expired(Utc::now()) {
            info!(user_id = session.user_id().unwrap_or("unknown"), "Session restored");
            return Ok(Some(session));
        }

        match self.refresh_stored(&session).await {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(err) => {
                warn!(error = %err, "Session could not be refreshed on restore");
                Ok(None)
            }
        }
    }

    /// A usable access token, refreshed first when close to expiry.
    pub async fn access_token(&self) -> Result<String> {
        let session = self.current_session().await?.ok_or(SyncError::NotSignedIn)?;
        if !session.expires_within(Utc::now(), Duration::seconds(REFRESH_MARGIN_SECS)) {
            return Ok(session.access_token);
        }

        if self.provider.is_none() {
            if session.is_expired(Utc::now()) {
                return Err(SyncError::auth("JWT expired"));
            }
            return Ok(session.access_token);
        }

        Ok(self.refresh_stored(&session).await?.access_token)
    }

    /// Single-flight refresh. A caller that waited on the lock reuses the
    /// session the previous holder stored.
    async fn refresh_stored(&self, stale: &SessionRecord) -> Result<SessionRecord> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(current) = self.current_session().await? {
            if current.refresh_token != stale.refresh_token
                && !current.expires_within(Utc::now(), Duration::seconds(REFRESH_MARGIN_SECS))
            {
                return Ok(current);
            }
        }

        let provider = self.provider()?.clone();
        let refresh_token = stale.refresh_token.clone();
        let outcome = self
            .recovery
            .safe_auth_operation("refresh_session", SafeAuthOptions::default(), || {
                let provider = provider.clone();
                let refresh_token = refresh_token.clone();
                async move { provider.refresh_session(&refresh_token).await }
            })
            .await;

        let session = outcome.into_result()?;
        self.sessions.save(&session).await?;
        debug!("Session refreshed");
        Ok(session)
    }

    pub async fn refresh(&self) -> AuthOutcome<AuthState> {
        let session = match self.current_session().await {
            Ok(Some(session)) => session,
            Ok(None) => return AuthOutcome::failed(user_message(Some(&SyncError::NotSignedIn))),
            Err(err) => return AuthOutcome::failed(user_message(Some(&err))),
        };

        match self.refresh_stored(&session).await {
            Ok(session) => AuthOutcome::ok(AuthState::from_session(&session)),
            Err(err) => AuthOutcome::failed(err.to_string()),
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthOutcome<AuthState> {
        let provider = match self.provider() {
            Ok(provider) => provider.clone(),
            Err(err) => return AuthOutcome::failed(err.to_string()),
        };

        self.keepalive.progress("signing_in", "Signing in...");
        let outcome = self
            .recovery
            .safe_auth_operation(
                "sign_in",
                SafeAuthOptions { clear_session_on_error: false, ..SafeAuthOptions::default() },
                || {
                    let provider = provider.clone();
                    async move { provider.sign_in_with_password(email, password).await }
                },
            )
            .await;

        let session = match outcome.into_result() {
            Ok(session) => session,
            Err(err) => {
                self.keepalive.progress("failed", "Sign-in failed");
                return AuthOutcome::failed(err.to_string());
            }
        };

        self.keepalive.progress("saving_session", "Saving session...");
        if let Err(err) = self.sessions.save(&session).await {
            return AuthOutcome::failed(err.to_string());
        }

        self.keepalive.progress("complete", "Signed in");
        info!(user_id = session.user_id().unwrap_or("unknown"), "Signed in");
        if let Err(err) = self.notifications.success("Signed in", "You can now sync your cards to Anki.").await
        {
            warn!(error = %err, "Failed to record sign-in notification");
        }
        AuthOutcome::ok(AuthState::from_session(&session))
    }

    /// Accepts a session handed over by the web app.
    pub async fn set_session(&self, raw: &Value) -> Result<AuthState> {
        let mut session = SessionRecord::decode(raw, Utc::now())?;
        if session.created_at.is_none() {
            session.created_at = Some(Utc::now());
        }
        self.sessions.save(&session).await?;
        info!(user_id = session.user_id().unwrap_or("unknown"), "Session handed over");
        Ok(AuthState::from_session(&session))
    }

    /// Provider logout is best effort; local credentials are always cleared.
    pub async fn sign_out(&self) -> Result<()> {
        if let (Some(provider), Ok(Some(session))) =
            (self.provider.as_ref(), self.current_session().await)
        {
            if let Err(err) = provider.sign_out(&session.access_token).await {
                warn!(error = %err, "Provider sign-out failed, clearing local session anyway");
            }
        }
        self.sessions.clear().await?;
        info!("Signed out");
        Ok(())
    }

    pub async fn auth_state(&self) -> Result<AuthState> {
        Ok(match self.current_session().await? {
            Some(session) => AuthState::from_session(&session),
            None => AuthState::signed_out(),
        })
    }
}
