use std::sync::{
    atomic::{
        AtomicU64,
        Ordering,
    },
    Mutex,
};

use serde_json::{
    json,
    Value,
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

struct Port {
    id: u64,
    tx: UnboundedSender<Value>,
}

/// The one long-lived connection a surface may open to hear progress during
/// slow auth flows. A new connection replaces the old reference; losing it
/// only stops the narration.
#[derive(Default)]
pub struct KeepAlive {
    port: Mutex<Option<Port>>,
    next_id: AtomicU64,
}

impl KeepAlive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, tx: UnboundedSender<Value>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut port) = self.port.lock() {
            if port.replace(Port { id, tx }).is_some() {
                debug!(port_id = id, "Keep-alive port replaced");
            }
        }
        id
    }

    /// Clears the reference only if `id` is still the tracked port.
    pub fn disconnect(&self, id: u64) {
        if let Ok(mut port) = self.port.lock() {
            if port.as_ref().is_some_and(|p| p.id == id) {
                *port = None;
                debug!(port_id = id, "Keep-alive port disconnected");
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.port.lock().map(|port| port.as_ref().is_some_and(|p| !p.tx.is_closed())).unwrap_or(false)
    }

    /// Best effort; returns whether anyone was listening.
    pub fn progress(&self, stage: &str, message: &str) -> bool {
        let Ok(mut port) = self.port.lock() else {
            return false;
        };
        let Some(current) = port.as_ref() else {
            return false;
        };

        let event = json!({ "event": "progress", "stage": stage, "message": message });
        if current.tx.send(event).is_err() {
            *port = None;
            return false;
        }
        true
    }
}
