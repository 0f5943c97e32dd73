mod common;

use std::time::Duration;

use ankisync::{
    config::UpdateStrategy,
    websocket::WebSocketServer,
};
use common::harness;
use futures_util::{
    SinkExt,
    StreamExt,
};
use serde_json::{
    json,
    Value,
};
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async,
    tungstenite::Message,
};

type Client = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn next_text(ws: &mut Client) -> String {
    loop {
        let frame = timeout(Duration::from_secs(5), ws.next()).await.unwrap().unwrap().unwrap();
        if let Message::Text(text) = frame {
            return text.as_str().to_string();
        }
    }
}

async fn next_json(ws: &mut Client) -> Value {
    serde_json::from_str(&next_text(ws).await).unwrap()
}

#[tokio::test]
async fn test_transport_routes_frames() {
    let h = harness(false, UpdateStrategy::Sequential).await;
    let listener = WebSocketServer::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = WebSocketServer::new(h.ctx.clone());
    tokio::spawn(server.clone().run(listener));

    let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

    ws.send(Message::text("PING")).await.unwrap();
    assert_eq!(next_text(&mut ws).await, "PONG");
    assert_eq!(server.client_count(), 1);

    ws.send(Message::text(json!({ "type": "PING", "requestId": "r-1" }).to_string())).await.unwrap();
    let response = next_json(&mut ws).await;
    assert_eq!(response["requestId"], "r-1");
    assert_eq!(response["success"], true);

    ws.send(Message::text("{not json")).await.unwrap();
    let response = next_json(&mut ws).await;
    assert!(response["error"].as_str().unwrap().starts_with("Invalid message payload: "));

    ws.send(Message::text(json!({ "type": "BOGUS", "requestId": 7 }).to_string())).await.unwrap();
    let response = next_json(&mut ws).await;
    assert_eq!(response, json!({ "ok": false, "error": "Unknown message type", "type": "BOGUS", "requestId": 7 }));

    h.ctx.notifications.warning("Heads up", "Anki is not running").await.unwrap();
    let event = next_json(&mut ws).await;
    assert_eq!(event["event"], "notification");
    assert_eq!(event["notification"]["title"], "Heads up");
}

#[tokio::test]
async fn test_keepalive_connection_receives_progress() {
    let h = harness(false, UpdateStrategy::Sequential).await;
    let listener = WebSocketServer::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(WebSocketServer::new(h.ctx.clone()).run(listener));

    let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
    ws.send(Message::text("KEEPALIVE")).await.unwrap();
    assert_eq!(next_json(&mut ws).await, json!({ "event": "keepalive", "connected": true }));

    assert!(h.ctx.keepalive.progress("signing_in", "Signing in..."));
    let event = next_json(&mut ws).await;
    assert_eq!(event, json!({ "event": "progress", "stage": "signing_in", "message": "Signing in..." }));

    ws.close(None).await.unwrap();
    drop(ws);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!h.ctx.keepalive.is_connected());
}
