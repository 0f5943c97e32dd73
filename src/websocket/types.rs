use std::net::SocketAddr;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use crate::router::SenderContext;

/// Liveness check; answered with a bare `PONG` text frame.
pub const PING_FRAME: &str = "PING";
pub const PONG_FRAME: &str = "PONG";
/// Turns the sending connection into the keep-alive port.
pub const KEEPALIVE_FRAME: &str = "KEEPALIVE";

/// Transport fields carried next to the request itself.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Envelope {
    #[serde(default)]
    pub request_id: Option<Value>,
    #[serde(default)]
    pub sender: Option<SenderContext>,
}

/// Outgoing frames for one connection. A JSON string is written as a bare
/// text frame, anything else as serialized JSON.
#[derive(Clone)]
pub struct ConnectedClient {
    pub id: u64,
    pub addr: SocketAddr,
    pub tx: UnboundedSender<Value>,
}

impl ConnectedClient {
    pub fn is_valid(&self) -> bool {
        !self.tx.is_closed()
    }
}
