use serde::{
    Deserialize,
    Serialize,
};
use serde_json::{
    json,
    Value,
};

use crate::core::{
    CardId,
    FieldMappings,
    SyncError,
};

/// Every request type a surface may send. Anything else is rejected before
/// dispatch.
pub const KNOWN_TYPES: &[&str] = &[
    "PING",
    "CHECK_ANKI_CONNECTION",
    "GET_ANKI_DECKS",
    "GET_ANKI_MODELS",
    "GET_ANKI_MODEL_FIELDS",
    "OPEN_ANKI_NOTE",
    "GET_ANKI_SETTINGS",
    "SAVE_ANKI_SETTINGS",
    "SYNC_CARDS",
    "SYNC_UNSYNCED_CARDS",
    "UPDATE_CARD_FIELDS",
    "GET_IMPORT",
    "GET_AUTH_STATE",
    "SIGN_IN",
    "SET_SESSION",
    "REFRESH_SESSION",
    "SIGN_OUT",
    "GET_NOTIFICATIONS",
    "DISMISS_NOTIFICATION",
    "CLEAR_NOTIFICATIONS",
];

pub fn is_known_type(kind: &str) -> bool {
    KNOWN_TYPES.contains(&kind)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    Ping,
    CheckAnkiConnection,
    GetAnkiDecks,
    GetAnkiModels,
    #[serde(rename_all = "camelCase")]
    GetAnkiModelFields {
        model_name: String,
    },
    #[serde(rename_all = "camelCase")]
    OpenAnkiNote {
        note_id: i64,
    },
    GetAnkiSettings,
    #[serde(rename_all = "camelCase")]
    SaveAnkiSettings {
        anki_connect_url: String,
        deck_name: String,
        note_type: String,
        #[serde(default)]
        field_mappings: FieldMappings,
    },
    #[serde(rename_all = "camelCase")]
    SyncCards {
        card_ids: Vec<CardId>,
    },
    SyncUnsyncedCards,
    #[serde(rename_all = "camelCase")]
    UpdateCardFields {
        card_ids: Vec<CardId>,
    },
    #[serde(rename_all = "camelCase")]
    GetImport {
        import_id: String,
    },
    GetAuthState,
    SignIn {
        email: String,
        password: String,
    },
    SetSession {
        session: Value,
    },
    RefreshSession,
    SignOut,
    GetNotifications,
    DismissNotification {
        id: String,
    },
    ClearNotifications,
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Ping => "PING",
            Request::CheckAnkiConnection => "CHECK_ANKI_CONNECTION",
            Request::GetAnkiDecks => "GET_ANKI_DECKS",
            Request::GetAnkiModels => "GET_ANKI_MODELS",
            Request::GetAnkiModelFields { .. } => "GET_ANKI_MODEL_FIELDS",
            Request::OpenAnkiNote { .. } => "OPEN_ANKI_NOTE",
            Request::GetAnkiSettings => "GET_ANKI_SETTINGS",
            Request::SaveAnkiSettings { .. } => "SAVE_ANKI_SETTINGS",
            Request::SyncCards { .. } => "SYNC_CARDS",
            Request::SyncUnsyncedCards => "SYNC_UNSYNCED_CARDS",
            Request::UpdateCardFields { .. } => "UPDATE_CARD_FIELDS",
            Request::GetImport { .. } => "GET_IMPORT",
            Request::GetAuthState => "GET_AUTH_STATE",
            Request::SignIn { .. } => "SIGN_IN",
            Request::SetSession { .. } => "SET_SESSION",
            Request::RefreshSession => "REFRESH_SESSION",
            Request::SignOut => "SIGN_OUT",
            Request::GetNotifications => "GET_NOTIFICATIONS",
            Request::DismissNotification { .. } => "DISMISS_NOTIFICATION",
            Request::ClearNotifications => "CLEAR_NOTIFICATIONS",
        }
    }

    /// Shape checks serde cannot express.
    fn check(self) -> Result<Self, SyncError> {
        let blank = |s: &str| s.trim().is_empty();
        let problem = match &self {
            Request::SyncCards { card_ids } | Request::UpdateCardFields { card_ids } if card_ids.is_empty() => {
                Some("cardIds must not be empty")
            }
            Request::GetAnkiModelFields { model_name } if blank(model_name) => Some("modelName must not be empty"),
            Request::GetImport { import_id } if blank(import_id) => Some("importId must not be empty"),
            Request::SignIn { email, password } if blank(email) || password.is_empty() => {
                Some("email and password are required")
            }
            _ => None,
        };

        match problem {
            Some(problem) => Err(SyncError::InvalidMessage(problem.to_string())),
            None => Ok(self),
        }
    }
}

/// Which surface sent the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Why a message never reached a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    UnknownType(Value),
    Invalid(String),
}

impl Rejection {
    pub fn into_response(self) -> Value {
        match self {
            Rejection::UnknownType(kind) => json!({ "ok": false, "error": "Unknown message type", "type": kind }),
            Rejection::Invalid(error) => json!({ "success": false, "error": error }),
        }
    }
}

/// `received -> validated`. Only a `Request` returned from here is ever
/// dispatched.
pub fn validate(message: &Value) -> Result<Request, Rejection> {
    let kind = message.get("type").cloned().unwrap_or(Value::Null);
    if !kind.as_str().is_some_and(is_known_type) {
        return Err(Rejection::UnknownType(kind));
    }

    serde_json::from_value::<Request>(message.clone())
        .map_err(|e| SyncError::InvalidMessage(e.to_string()))
        .and_then(Request::check)
        .map_err(|e| Rejection::Invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_known_type_has_a_variant() {
        for kind in KNOWN_TYPES {
            // payload-less variants parse directly, the rest fail as invalid
            match validate(&json!({ "type": kind })) {
                Ok(request) => assert_eq!(request.kind(), *kind),
                Err(Rejection::Invalid(_)) => {}
                Err(other) => panic!("{kind} rejected as {other:?}"),
            }
        }
    }

    #[test]
    fn test_unknown_and_missing_types_are_rejected() {
        let rejection = validate(&json!({ "type": "DELETE_EVERYTHING" })).unwrap_err();
        assert_eq!(
            rejection.into_response(),
            json!({ "ok": false, "error": "Unknown message type", "type": "DELETE_EVERYTHING" })
        );

        let rejection = validate(&json!({ "cardIds": [1] })).unwrap_err();
        assert_eq!(rejection, Rejection::UnknownType(Value::Null));

        assert!(matches!(validate(&json!({ "type": 5 })), Err(Rejection::UnknownType(_))));
    }

    #[test]
    fn test_payload_and_envelope_fields() {
        let request = validate(&json!({
            "type": "SYNC_CARDS",
            "cardIds": [1, "b"],
            "requestId": "r-1",
            "sender": { "surface": "popup" }
        }))
        .unwrap();
        assert_eq!(request, Request::SyncCards { card_ids: vec![CardId::Int(1), CardId::from("b")] });

        let Err(Rejection::Invalid(error)) = validate(&json!({ "type": "SYNC_CARDS", "cardIds": [] })) else {
            panic!("empty cardIds accepted");
        };
        assert_eq!(error, "Invalid message payload: cardIds must not be empty");

        let Err(Rejection::Invalid(error)) = validate(&json!({ "type": "OPEN_ANKI_NOTE", "noteId": "x" })) else {
            panic!("bad noteId accepted");
        };
        assert!(error.starts_with("Invalid message payload: "));
    }
}
