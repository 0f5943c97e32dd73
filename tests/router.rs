mod common;

use ankisync::{
    config::UpdateStrategy,
    persistence::{
        keys,
        StorageArea,
    },
    router::SenderContext,
};
use common::harness;
use serde_json::json;
use tokio::sync::oneshot;
use wiremock::{
    matchers::{
        body_partial_json,
        method,
        path,
    },
    Mock,
    ResponseTemplate,
};

#[tokio::test]
async fn test_unknown_type_never_reaches_a_handler() {
    let h = harness(true, UpdateStrategy::Sequential).await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.anki)
        .await;

    let (tx, rx) = oneshot::channel();
    let kept_open = h.router.handle(json!({ "type": "GET_ANKI_DECKZ" }), SenderContext::default(), tx);
    assert!(kept_open);
    assert_eq!(rx.await.unwrap(), json!({ "ok": false, "error": "Unknown message type", "type": "GET_ANKI_DECKZ" }));
}

#[tokio::test]
async fn test_malformed_payload_is_rejected_before_dispatch() {
    let h = harness(true, UpdateStrategy::Sequential).await;
    let response = h
        .router
        .request(json!({ "type": "GET_ANKI_MODEL_FIELDS", "modelName": 12 }), SenderContext::default())
        .await;
    assert_eq!(response["success"], false);
    assert!(response["error"].as_str().unwrap().starts_with("Invalid message payload: "));
}

#[tokio::test]
async fn test_anki_queries_use_saved_endpoint() {
    let h = harness(true, UpdateStrategy::Sequential).await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "action": "deckNames" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": ["Default", "Mining"], "error": null })))
        .mount(&h.anki)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "action": "version" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": 6, "error": null })))
        .mount(&h.anki)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "action": "guiBrowse", "params": { "query": "nid:42" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": [42], "error": null })))
        .expect(1)
        .mount(&h.anki)
        .await;

    let decks = h.router.request(json!({ "type": "GET_ANKI_DECKS" }), SenderContext::default()).await;
    assert_eq!(decks, json!({ "success": true, "decks": ["Default", "Mining"] }));

    let status = h.router.request(json!({ "type": "CHECK_ANKI_CONNECTION" }), SenderContext::default()).await;
    assert_eq!(status, json!({ "success": true, "connected": true, "version": 6 }));

    let opened = h.router.request(json!({ "type": "OPEN_ANKI_NOTE", "noteId": 42 }), SenderContext::default()).await;
    assert_eq!(opened, json!({ "success": true }));
}

#[tokio::test]
async fn test_unreachable_anki_is_a_status_not_an_error() {
    let h = harness(false, UpdateStrategy::Sequential).await;
    h.ctx
        .storage
        .set(StorageArea::Local, keys::ANKI_CONNECT_URL, json!("http://127.0.0.1:9"))
        .await
        .unwrap();

    let status = h.router.request(json!({ "type": "CHECK_ANKI_CONNECTION" }), SenderContext::default()).await;
    assert_eq!(status["success"], false);
    assert_eq!(status["connected"], false);
}

#[tokio::test]
async fn test_sign_in_stores_session_and_notifies() {
    let h = harness(true, UpdateStrategy::Sequential).await;
    let expires_at = chrono::Utc::now().timestamp() + 3600;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access",
            "refresh_token": "refresh",
            "expires_at": expires_at,
            "user": { "id": "user-1", "email": "a@b.c" }
        })))
        .expect(1)
        .mount(&h.planner)
        .await;

    let response = h
        .router
        .request(json!({ "type": "SIGN_IN", "email": "a@b.c", "password": "pw" }), SenderContext::default())
        .await;
    assert_eq!(response["success"], true);
    assert_eq!(response["data"]["signedIn"], true);

    let state = h.router.request(json!({ "type": "GET_AUTH_STATE" }), SenderContext::default()).await;
    assert_eq!(state["signedIn"], true);
    assert_eq!(state["user"]["id"], "user-1");

    let notifications = h.router.request(json!({ "type": "GET_NOTIFICATIONS" }), SenderContext::default()).await;
    let id = notifications["notifications"][0]["id"].as_str().unwrap().to_string();
    let dismissed = h
        .router
        .request(json!({ "type": "DISMISS_NOTIFICATION", "id": id }), SenderContext::default())
        .await;
    assert_eq!(dismissed, json!({ "success": true, "dismissed": true }));
}

#[tokio::test]
async fn test_set_session_rejects_invalid_blob() {
    let h = harness(true, UpdateStrategy::Sequential).await;
    let response = h
        .router
        .request(
            json!({ "type": "SET_SESSION", "session": { "access_token": "a", "refresh_token": "" } }),
            SenderContext::default(),
        )
        .await;
    assert_eq!(response["success"], false);

    let state = h.router.request(json!({ "type": "GET_AUTH_STATE" }), SenderContext::default()).await;
    assert_eq!(state, json!({ "success": true, "signedIn": false }));
}
