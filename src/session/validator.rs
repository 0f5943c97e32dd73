use chrono::{
    DateTime,
    Duration,
    Utc,
};
use serde::Serialize;
use serde_json::Value;

use crate::core::utils::parse_timestamp;

pub const MISSING_TOKENS: &str = "Missing access_token or refresh_token";
pub const EMPTY_TOKENS: &str = "Empty access_token or refresh_token";
pub const EXPIRED_TOO_LONG: &str = "Session expired more than 24 hours ago";
pub const TOO_OLD: &str = "Session is older than 30 days";
pub const VALIDATION_ERROR: &str = "Session validation error";

/// Expired sessions inside this window are still accepted; the token gets
/// refreshed on first use.
pub const EXPIRY_GRACE_HOURS: i64 = 24;
pub const MAX_SESSION_AGE_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionValidation {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SessionValidation {
    fn valid() -> Self {
        Self { is_valid: true, reason: None }
    }

    fn invalid(reason: &str) -> Self {
        Self { is_valid: false, reason: Some(reason.to_string()) }
    }
}

/// Checks a persisted session blob before anything trusts it. Only the two
/// tokens and the two timestamps are inspected.
pub fn validate_session(session: &Value, now: DateTime<Utc>) -> SessionValidation {
    match check(session, now) {
        Ok(()) => SessionValidation::valid(),
        Err(reason) => SessionValidation::invalid(reason),
    }
}

fn check(session: &Value, now: DateTime<Utc>) -> Result<(), &'static str> {
    let fields = session.as_object().ok_or(VALIDATION_ERROR)?;

    let access = present(fields.get("access_token"));
    let refresh = present(fields.get("refresh_token"));
    let (access, refresh) = match (access, refresh) {
        (Some(access), Some(refresh)) => (access, refresh),
        _ => return Err(MISSING_TOKENS),
    };

    let (access, refresh) = match (access.as_str(), refresh.as_str()) {
        (Some(access), Some(refresh)) => (access, refresh),
        _ => return Err(VALIDATION_ERROR),
    };
    if access.trim().is_empty() || refresh.trim().is_empty() {
        return Err(EMPTY_TOKENS);
    }

    if let Some(raw) = present(fields.get("expires_at")) {
        let expires_at = parse_timestamp(raw).ok_or(VALIDATION_ERROR)?;
        if now - expires_at > Duration::hours(EXPIRY_GRACE_HOURS) {
            return Err(EXPIRED_TOO_LONG);
        }
    }

    if let Some(raw) = present(fields.get("created_at")) {
        let created_at = parse_timestamp(raw).ok_or(VALIDATION_ERROR)?;
        if now - created_at > Duration::days(MAX_SESSION_AGE_DAYS) {
            return Err(TOO_OLD);
        }
    }

    Ok(())
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn session_with(expires_at: DateTime<Utc>, created_at: DateTime<Utc>) -> Value {
        json!({
            "access_token": "access",
            "refresh_token": "refresh",
            "expires_at": expires_at.timestamp(),
            "created_at": created_at.timestamp_millis(),
            "user": {"id": "u1"},
        })
    }

    #[test]
    fn test_missing_tokens() {
        let cases = [
            json!({"refresh_token": "r"}),
            json!({"access_token": "a"}),
            json!({"access_token": null, "refresh_token": "r", "expires_at": "garbage"}),
            json!({}),
        ];
        for case in cases {
            let result = validate_session(&case, now());
            assert!(!result.is_valid);
            assert_eq!(result.reason.as_deref(), Some(MISSING_TOKENS), "{case}");
        }
    }

    #[test]
    fn test_blank_tokens() {
        for (access, refresh) in [("", "r"), ("a", "   "), ("\t\n", "r")] {
            let session = json!({"access_token": access, "refresh_token": refresh, "created_at": 0});
            let result = validate_session(&session, now());
            assert_eq!(result.reason.as_deref(), Some(EMPTY_TOKENS));
        }
    }

    #[test]
    fn test_expiry_boundary_at_24_hours() {
        let created = now() - Duration::days(1);
        let at_limit = session_with(now() - Duration::hours(24), created);
        assert!(validate_session(&at_limit, now()).is_valid);

        let past_limit = session_with(now() - Duration::hours(24) - Duration::seconds(1), created);
        let result = validate_session(&past_limit, now());
        assert_eq!(result.reason.as_deref(), Some(EXPIRED_TOO_LONG));
    }

    #[test]
    fn test_age_boundary_at_30_days() {
        let expires = now() + Duration::hours(1);
        let at_limit = session_with(expires, now() - Duration::days(30));
        assert!(validate_session(&at_limit, now()).is_valid);

        let past_limit = session_with(expires, now() - Duration::days(30) - Duration::seconds(1));
        assert_eq!(validate_session(&past_limit, now()).reason.as_deref(), Some(TOO_OLD));
    }

    #[test]
    fn test_malformed_input_fails_closed() {
        let cases = [
            json!("a string"),
            json!(null),
            json!(["access", "refresh"]),
            json!({"access_token": "a", "refresh_token": "r", "expires_at": "soon"}),
            json!({"access_token": "a", "refresh_token": "r", "created_at": {"at": 1}}),
            json!({"access_token": 5, "refresh_token": "r"}),
        ];
        for case in cases {
            assert_eq!(
                validate_session(&case, now()).reason.as_deref(),
                Some(VALIDATION_ERROR),
                "{case}"
            );
        }
    }

    #[test]
    fn test_extra_fields_ignored() {
        let session = json!({
            "access_token": "a",
            "refresh_token": "r",
            "provider_token": "whatever",
            "schema": 7,
        });
        assert_eq!(validate_session(&session, now()), SessionValidation::valid());
    }
}
