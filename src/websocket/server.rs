use std::{
    net::SocketAddr,
    sync::{
        atomic::{
            AtomicU64,
            Ordering,
        },
        Arc,
        Mutex,
    },
};

use serde_json::json;
use tokio::{
    net::TcpListener,
    sync::broadcast::error::RecvError,
};
use tracing::{
    debug,
    error,
    info,
    warn,
};

use super::{
    connection::handle_connection,
    types::ConnectedClient,
};
use crate::{
    context::AppContext,
    core::{
        Result,
        SyncError,
    },
    router::Router,
};

/// Local transport for browser surfaces: one WebSocket connection per
/// context, all feeding the same router.
pub struct WebSocketServer {
    ctx: Arc<AppContext>,
    router: Router,
    clients: Arc<Mutex<Vec<ConnectedClient>>>,
    next_client_id: AtomicU64,
}

impl WebSocketServer {
    pub fn new(ctx: Arc<AppContext>) -> Arc<Self> {
        Arc::new(Self {
            router: Router::new(ctx.clone()),
            ctx,
            clients: Arc::new(Mutex::new(Vec::new())),
            next_client_id: AtomicU64::new(1),
        })
    }

    pub async fn bind(addr: &str) -> Result<TcpListener> {
        TcpListener::bind(addr)
            .await
            .map_err(|e| SyncError::Custom(format!("Failed to bind to address {}: {}", addr, e)))
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().map(|clients| clients.len()).unwrap_or(0)
    }

    /// Accepts connections until the listener fails.
    pub async fn run(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "WebSocket server running");

        self.spawn_notification_forwarder();

        loop {
            let (stream, addr) = listener.accept().await?;
            self.spawn_connection(stream, addr);
        }
    }

    fn spawn_connection(&self, stream: tokio::net::TcpStream, addr: SocketAddr) {
        let client_id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
        let router = self.router.clone();
        let keepalive = self.ctx.keepalive.clone();
        let clients = self.clients.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, addr, client_id, router, keepalive, clients).await {
                error!(%addr, error = %e, "Error handling connection");
            }
        });
    }

    /// Pushes every new notification to all open surfaces.
    fn spawn_notification_forwarder(&self) {
        let mut notifications = self.ctx.notifications.subscribe();
        let clients = self.clients.clone();

        tokio::spawn(async move {
            loop {
                let notification = match notifications.recv().await {
                    Ok(notification) => notification,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Notification forwarder lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                let event = json!({ "event": "notification", "notification": notification });
                if let Ok(mut clients) = clients.lock() {
                    clients.retain(|client| client.tx.send(event.clone()).is_ok());
                    debug!(delivered = clients.len(), "Notification broadcast");
                }
            }
        });
    }
}
