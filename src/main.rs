use std::path::PathBuf;

use ankisync::{
    config::AppConfig,
    context::AppContext,
    lifecycle::{
        self,
        InstallReason,
    },
    persistence::Storage,
    websocket::WebSocketServer,
    Result,
};
use clap::Parser;
use tokio::signal;
use tracing::{
    error,
    info,
};
use tracing_subscriber::{
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser, Debug)]
#[command(name = "ankisync")]
#[command(about = "Background sync service between the reader web app and Anki")]
#[command(version)]
struct Args {
    /// Config file (defaults to config.json in the app data directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address for the local WebSocket transport
    #[arg(short, long)]
    listen: Option<String>,

    /// Run the install hook before starting
    #[arg(long, value_enum)]
    install_reason: Option<InstallReason>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = AppConfig::load(args.config.as_deref());
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }

    let store_path = config.local_store_path();
    info!(path = %store_path.display(), "Opening local store");
    let storage = Storage::open(&store_path).await?;

    if let Some(reason) = args.install_reason {
        lifecycle::on_installed(&storage, reason).await?;
    }
    lifecycle::check_version_change(&storage, lifecycle::RUNNING_VERSION).await?;

    let listener = WebSocketServer::bind(&config.listen_addr).await?;
    let ctx = AppContext::build(config, storage).await?;

    match lifecycle::on_startup(&ctx).await {
        Ok(outcome) => info!(?outcome, "Startup complete"),
        Err(e) => error!(error = %e, "Startup hook failed"),
    }

    let server = WebSocketServer::new(ctx);
    tokio::select! {
        result = server.run(listener) => result?,
        _ = shutdown_signal() => info!("Shutting down"),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
