pub mod connection;
pub mod server;
pub mod types;

pub use server::WebSocketServer;
pub use types::{
    KEEPALIVE_FRAME,
    PING_FRAME,
    PONG_FRAME,
};
