use std::sync::OnceLock;

use regex::Regex;

use crate::core::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// The credential can never work again; re-authentication is required.
    SessionInvalid,
    /// Auth related but possibly recoverable.
    RetryableAuth,
    Other,
}

pub const MSG_SESSION_EXPIRED: &str = "Your session has expired. Please sign in again.";
pub const MSG_NOT_SIGNED_IN: &str = "You are not signed in. Please sign in to continue.";
pub const MSG_SESSION_NOT_FOUND: &str = "Authentication session not found. Please sign in again.";
pub const MSG_NETWORK: &str = "Network error. Please check your connection and try again.";
pub const MSG_GENERIC: &str = "An authentication error occurred. Please try signing in again.";
pub const MSG_UNKNOWN: &str = "An unknown error occurred";

const SESSION_INVALID_CODES: &[&str] = &[
    "refresh_token_not_found",
    "refresh_token_already_used",
    "session_not_found",
    "session_expired",
    "bad_jwt",
    "invalid_grant",
];

fn session_invalid_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)invalid refresh token|refresh token not found|already used|auth session missing|jwt expired|invalid jwt|invalid[_ ]grant|session[_ ]not[_ ]found",
        )
        .expect("static regex")
    })
}

struct MessagePatterns {
    refresh_rejected: Regex,
    session_missing: Regex,
    jwt_rejected: Regex,
    refresh_not_found: Regex,
}

fn message_patterns() -> &'static MessagePatterns {
    static PATTERNS: OnceLock<MessagePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| MessagePatterns {
        refresh_rejected: Regex::new(r"(?i)invalid refresh token|already used").expect("static regex"),
        session_missing: Regex::new(r"(?i)auth session missing").expect("static regex"),
        jwt_rejected: Regex::new(r"(?i)jwt expired|invalid jwt").expect("static regex"),
        refresh_not_found: Regex::new(r"(?i)refresh token not found").expect("static regex"),
    })
}

pub fn is_session_invalid(err: &SyncError) -> bool {
    if matches!(err, SyncError::NotSignedIn) {
        return true;
    }
    if err.code().is_some_and(|code| SESSION_INVALID_CODES.contains(&code)) {
        return true;
    }
    session_invalid_pattern().is_match(&err.to_string())
}

pub fn classify(err: &SyncError) -> AuthErrorKind {
    if is_session_invalid(err) {
        AuthErrorKind::SessionInvalid
    } else if matches!(err, SyncError::Auth { .. }) {
        AuthErrorKind::RetryableAuth
    } else {
        AuthErrorKind::Other
    }
}

/// Short, stable text for surfaces. Order follows the precedence of the
/// provider's own messages, e.g. "Invalid Refresh Token: Refresh Token Not
/// Found" reads as an expired session.
pub fn user_message(err: Option<&SyncError>) -> &'static str {
    let Some(err) = err else {
        return MSG_UNKNOWN;
    };
    let text = err.to_string();
    let code = err.code().unwrap_or_default();
    let patterns = message_patterns();

    if patterns.refresh_rejected.is_match(&text)
        || code == "refresh_token_already_used"
    {
        MSG_SESSION_EXPIRED
    } else if patterns.session_missing.is_match(&text) || matches!(err, SyncError::NotSignedIn) {
        MSG_NOT_SIGNED_IN
    } else if patterns.jwt_rejected.is_match(&text) || code == "bad_jwt" {
        MSG_SESSION_EXPIRED
    } else if patterns.refresh_not_found.is_match(&text) || code == "refresh_token_not_found" {
        MSG_SESSION_NOT_FOUND
    } else if text.contains("Network") {
        MSG_NETWORK
    } else {
        MSG_GENERIC
    }
}
