use std::{
    net::SocketAddr,
    sync::{
        Arc,
        Mutex,
    },
};

use futures_util::{
    SinkExt,
    StreamExt,
};
use serde_json::{
    json,
    Value,
};
use tokio::sync::{
    mpsc::{
        self,
        UnboundedSender,
    },
    oneshot,
};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{
    debug,
    info,
    warn,
};

use super::types::{
    ConnectedClient,
    Envelope,
    KEEPALIVE_FRAME,
    PING_FRAME,
    PONG_FRAME,
};
use crate::{
    core::{
        Result,
        SyncError,
    },
    router::{
        KeepAlive,
        Router,
    },
};

fn encode(value: Value) -> Message {
    match value {
        Value::String(text) => Message::text(text),
        other => Message::text(other.to_string()),
    }
}

/// Routes one text frame. The response is written whenever the handler
/// finishes; frames from the same connection do not wait on each other.
fn route_frame(router: &Router, text: &str, tx: &UnboundedSender<Value>) {
    let message: Value = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            let error = SyncError::InvalidMessage(e.to_string()).to_string();
            let _ = tx.send(json!({ "success": false, "error": error }));
            return;
        }
    };

    let envelope: Envelope = serde_json::from_value(message.clone()).unwrap_or_default();
    let (respond, response) = oneshot::channel();
    router.handle(message, envelope.sender.unwrap_or_default(), respond);

    let tx = tx.clone();
    tokio::spawn(async move {
        let Ok(mut response) = response.await else {
            return;
        };
        if let (Some(request_id), Some(object)) = (envelope.request_id, response.as_object_mut()) {
            object.insert("requestId".into(), request_id);
        }
        let _ = tx.send(response);
    });
}

pub async fn handle_connection(
    stream: tokio::net::TcpStream,
    addr: SocketAddr,
    client_id: u64,
    router: Router,
    keepalive: Arc<KeepAlive>,
    clients: Arc<Mutex<Vec<ConnectedClient>>>,
) -> Result<()> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    debug!(%addr, client_id, "WebSocket connection established");

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();

    if let Ok(mut clients) = clients.lock() {
        clients.push(ConnectedClient { id: client_id, addr, tx: tx.clone() });
        info!(%addr, total = clients.len(), "Client registered");
    }

    let forward_task = tokio::spawn(async move {
        while let Some(value) = rx.recv().await {
            if ws_sender.send(encode(value)).await.is_err() {
                break;
            }
        }
    });

    let mut keepalive_id = None;
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match text.as_str().trim() {
                PING_FRAME => {
                    let _ = tx.send(Value::from(PONG_FRAME));
                }
                KEEPALIVE_FRAME => {
                    keepalive_id = Some(keepalive.connect(tx.clone()));
                    let _ = tx.send(json!({ "event": "keepalive", "connected": true }));
                    debug!(%addr, "Keep-alive port opened");
                }
                frame => route_frame(&router, frame, &tx),
            },
            Ok(Message::Close(_)) => {
                debug!(%addr, "Client closed the connection");
                break;
            }
            Err(e) => {
                warn!(%addr, error = %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    if let Some(id) = keepalive_id {
        keepalive.disconnect(id);
    }
    forward_task.abort();
    drop(tx);

    if let Ok(mut clients) = clients.lock() {
        clients.retain(|client| client.id != client_id && client.is_valid());
        info!(%addr, remaining = clients.len(), "Client disconnected");
    }

    Ok(())
}
