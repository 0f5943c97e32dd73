use chrono::Utc;
use clap::ValueEnum;
use serde_json::Value;
use tracing::{
    info,
    warn,
};

use crate::{
    auth::classifier::MSG_SESSION_EXPIRED,
    context::AppContext,
    core::Result,
    persistence::{
        keys,
        Storage,
        StorageArea,
    },
    session::validator::validate_session,
};

pub const RUNNING_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Why the process was (re)installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InstallReason {
    /// Fresh install.
    Install,
    Update,
    /// Any other reason, e.g. a forced reload.
    Reload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StartupOutcome {
    Restored { user_id: Option<String> },
    LegacySessionValid,
    /// A stored session failed validation and was torn down.
    Invalidated { reason: String },
    NoSession,
}

async fn purge_session_state(storage: &Storage) -> Result<()> {
    storage.purge(keys::CREDENTIAL_KEYS).await?;
    storage.purge(keys::TRANSIENT_KEYS).await
}

async fn write_version_marker(storage: &Storage, version: &str) -> Result<()> {
    storage.set(StorageArea::Local, keys::EXTENSION_VERSION, Value::from(version)).await
}

/// Decides what persisted state survives. The version marker is written
/// afterwards so the cold-start check does not purge again.
pub async fn on_installed(storage: &Storage, reason: InstallReason) -> Result<()> {
    match reason {
        InstallReason::Install => {
            info!("Fresh install, clearing all persisted state");
            storage.clear_all().await?;
        }
        InstallReason::Update => {
            info!("Update, clearing transient keys only");
            storage.purge(keys::TRANSIENT_KEYS).await?;
        }
        InstallReason::Reload => {
            info!("Reload, clearing credentials and transient keys");
            purge_session_state(storage).await?;
        }
    }
    write_version_marker(storage, RUNNING_VERSION).await
}

/// Returns true when a different persisted version forced a purge. A
/// missing marker is a first run and only records the version.
pub async fn check_version_change(storage: &Storage, running: &str) -> Result<bool> {
    let previous = storage.get_typed::<String>(StorageArea::Local, keys::EXTENSION_VERSION).await.unwrap_or(None);

    let changed = match previous.as_deref() {
        Some(previous) if previous != running => {
            warn!(previous, running, "Version changed, purging session state");
            purge_session_state(storage).await?;
            true
        }
        _ => false,
    };
    if previous.as_deref() != Some(running) {
        write_version_marker(storage, running).await?;
    }
    Ok(changed)
}

/// Restores the session through the auth manager, or validates the legacy
/// key when no provider is configured.
pub async fn on_startup(ctx: &AppContext) -> Result<StartupOutcome> {
    if ctx.auth.is_available() {
        return Ok(match ctx.auth.restore_session().await {
            Ok(Some(session)) => StartupOutcome::Restored { user_id: session.user_id().map(str::to_string) },
            Ok(None) => StartupOutcome::NoSession,
            Err(err) => {
                warn!(error = %err, "Session restore failed");
                StartupOutcome::NoSession
            }
        });
    }

    let Some(raw) = ctx.sessions.load_legacy_raw().await? else {
        info!("No stored session");
        return Ok(StartupOutcome::NoSession);
    };

    let validation = validate_session(&raw, Utc::now());
    if validation.is_valid {
        info!("Legacy session is valid");
        return Ok(StartupOutcome::LegacySessionValid);
    }

    let reason = validation.reason.unwrap_or_default();
    warn!(reason = %reason, "Legacy session rejected, tearing down");
    ctx.auth.recovery().teardown(MSG_SESSION_EXPIRED).await?;
    Ok(StartupOutcome::Invalidated { reason })
}
