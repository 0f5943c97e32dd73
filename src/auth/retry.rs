use std::{
    future::Future,
    sync::Arc,
};

use serde::Serialize;
use tokio::time::sleep;
use tracing::{
    debug,
    error,
    warn,
};

use super::classifier::{
    classify,
    is_session_invalid,
    user_message,
    AuthErrorKind,
};
use crate::{
    config::RetryPolicy,
    core::{
        Result,
        SyncError,
    },
    notifications::{
        Notification,
        NotificationRelay,
    },
    session::SessionStore,
};

/// Runs `operation` up to `policy.max_attempts` times, sleeping
/// `base * 2^(attempt-1)` between attempts. Session-invalid failures are
/// returned immediately; otherwise the last error is returned.
pub async fn retry_with_backoff<T, F, Fut>(operation: F, policy: RetryPolicy) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_while(operation, policy, |_| true).await
}

/// `retry_with_backoff`, but a failure `should_retry` rejects is returned
/// without another attempt.
async fn retry_while<T, F, Fut, P>(mut operation: F, policy: RetryPolicy, should_retry: P) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&SyncError) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if is_session_invalid(&err) => {
                debug!(attempt, error = %err, "Session invalid, not retrying");
                return Err(err);
            }
            Err(err) if !should_retry(&err) => {
                debug!(attempt, error = %err, "Failure is not retryable");
                return Err(err);
            }
            Err(err) if attempt >= max_attempts => return Err(err),
            Err(err) => {
                let delay = policy.delay_for(attempt);
                debug!(attempt, max_attempts, ?delay, error = %err, "Attempt failed, backing off");
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SafeAuthOptions {
    /// Overrides the policy's attempt count when set.
    pub max_retries: Option<u32>,
    pub clear_session_on_error: bool,
    /// Also back off on auth errors that are not session-invalid, such as
    /// rate limits. Off by default: a rejected credential stays rejected.
    pub retry_auth_errors: bool,
}

impl Default for SafeAuthOptions {
    fn default() -> Self {
        Self { max_retries: None, clear_session_on_error: true, retry_auth_errors: false }
    }
}

/// Uniform result for auth operations; callers never see a raw error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthOutcome<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> AuthOutcome<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(error.into()) }
    }

    pub fn into_result(self) -> Result<T> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(SyncError::auth(self.error.unwrap_or_else(|| user_message(None).to_string()))),
        }
    }
}

/// Teardown and notification when a credential turns out to be unusable.
#[derive(Clone)]
pub struct SessionRecovery {
    sessions: SessionStore,
    notifications: Arc<NotificationRelay>,
    policy: RetryPolicy,
}

impl SessionRecovery {
    pub fn new(sessions: SessionStore, notifications: Arc<NotificationRelay>, policy: RetryPolicy) -> Self {
        Self { sessions, notifications, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Clears every credential key and tells open surfaces to sign in again.
    pub async fn teardown(&self, message: &str) -> Result<()> {
        self.sessions.clear().await?;
        self.notifications.notify(Notification::session_expired(message)).await
    }

    pub async fn safe_auth_operation<T, F, Fut>(
        &self,
        context: &str,
        options: SafeAuthOptions,
        operation: F,
    ) -> AuthOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut policy = self.policy;
        if let Some(max_retries) = options.max_retries {
            policy.max_attempts = max_retries;
        }

        let retry_auth_errors = options.retry_auth_errors;
        let should_retry = |err: &SyncError| retry_auth_errors || classify(err) != AuthErrorKind::RetryableAuth;

        match retry_while(operation, policy, should_retry).await {
            Ok(data) => AuthOutcome::ok(data),
            Err(err) => {
                let message = user_message(Some(&err));
                if is_session_invalid(&err) {
                    warn!(context, message, "Session is no longer valid");
                    if options.clear_session_on_error {
                        if let Err(e) = self.teardown(message).await {
                            error!(context, error = %e, "Session teardown failed");
                        }
                    }
                } else {
                    error!(context, error = %err, "Auth operation failed");
                }
                AuthOutcome::failed(message)
            }
        }
    }
}
