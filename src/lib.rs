//! Background coordination layer for syncing web-app vocabulary cards into
//! Anki through AnkiConnect.

pub mod anki;
pub mod auth;
pub mod config;
pub mod context;
pub mod core;
pub mod lifecycle;
pub mod notifications;
pub mod persistence;
pub mod planner;
pub mod router;
pub mod session;
pub mod sync;
pub mod websocket;

pub use config::AppConfig;
pub use context::AppContext;
pub use core::{
    Result,
    SyncError,
};
pub use router::Router;
