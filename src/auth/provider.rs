use async_trait::async_trait;
use chrono::{
    Duration,
    TimeZone,
    Utc,
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{
    json,
    Value,
};
use tracing::debug;

use crate::{
    core::{
        http::join_url,
        Result,
        SyncError,
    },
    session::SessionRecord,
};

/// The identity provider. Token issuance lives there; this side only
/// exchanges credentials and refresh tokens for sessions.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<SessionRecord>;
    async fn refresh_session(&self, refresh_token: &str) -> Result<SessionRecord>;
    async fn sign_out(&self, access_token: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    user: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    error_code: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl ErrorBody {
    fn into_error(self, status: reqwest::StatusCode) -> SyncError {
        let message = self
            .error_description
            .or(self.msg)
            .or(self.message)
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| format!("Authentication failed ({})", status));
        SyncError::Auth { message, code: self.error_code.or(self.error) }
    }
}

/// GoTrue (Supabase auth) over its REST endpoints.
pub struct SupabaseAuth {
    client: Client,
    url: String,
    anon_key: String,
}

impl SupabaseAuth {
    pub fn new(client: Client, url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self { client, url: url.into(), anon_key: anon_key.into() }
    }

    async fn token_request(&self, grant_type: &str, body: Value) -> Result<SessionRecord> {
        let url = join_url(&self.url, &format!("auth/v1/token?grant_type={}", grant_type));
        debug!(grant_type, "Requesting session from identity provider");

        let resp = self.client.post(url).header("apikey", &self.anon_key).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body: ErrorBody = resp.json().await.unwrap_or_default();
            return Err(body.into_error(status));
        }

        let token: TokenResponse = resp.json().await?;
        let now = Utc::now();
        let expires_at = match (token.expires_at, token.expires_in) {
            (Some(at), _) => Utc.timestamp_opt(at, 0).single(),
            (None, Some(secs)) => Some(now + Duration::seconds(secs)),
            (None, None) => None,
        };

        Ok(SessionRecord {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            created_at: Some(now),
            user: token.user,
        })
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<SessionRecord> {
        self.token_request("password", json!({ "email": email, "password": password })).await
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<SessionRecord> {
        self.token_request("refresh_token", json!({ "refresh_token": refresh_token })).await
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let url = join_url(&self.url, "auth/v1/logout");
        let resp = self
            .client
            .post(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body: ErrorBody = resp.json().await.unwrap_or_default();
        Err(body.into_error(status))
    }
}
