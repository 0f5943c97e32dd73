use std::time::Duration;

use reqwest::{
    header::USER_AGENT,
    Client,
    RequestBuilder,
    Response,
};

use crate::core::SyncError;

const USER_AGENT_VALUE: &str = concat!("ankisync/", env!("CARGO_PKG_VERSION"), " (+reqwest)");

pub fn http_client(timeout_secs: u64) -> Result<Client, SyncError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| SyncError::Custom(format!("HTTP client build failed: {e}")))
}

/// Attaches the bearer header when a token is available. Unauthenticated
/// requests are allowed through unchanged.
pub fn with_bearer(builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    let builder = builder.header(USER_AGENT, USER_AGENT_VALUE);
    match token {
        Some(token) => builder.bearer_auth(token),
        None => builder,
    }
}

/// Returns the response untouched on 2xx. Otherwise the body text is read
/// and handed to `on_error`, so callers decide how verbatim bodies surface.
pub async fn ensure_success(
    resp: Response,
    on_error: impl FnOnce(reqwest::StatusCode, String) -> SyncError,
) -> Result<Response, SyncError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let body = if body.trim().is_empty() {
        format!("HTTP error {}", status)
    } else {
        body
    };
    Err(on_error(status, body))
}

pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
