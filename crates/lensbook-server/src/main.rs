//! Lensbook Server - real-time notification service.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lensbook_core::{SledUserDirectory, Storage, User};
use lensbook_server::auth::JwtAuthenticator;
use lensbook_server::stream::SessionRegistry;
use lensbook_server::{create_router, Args, ServerConfig, Services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let log_filter = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "lensbook_server={},lensbook_core={},tower_http=info",
                    log_filter, log_filter
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting Lensbook server");

    let config: ServerConfig = args.into();
    tracing::info!(
        data_path = %config.data_path.display(),
        listen_address = %config.listen_address,
        heartbeat_secs = config.session.heartbeat_interval.as_secs(),
        max_sessions = config.max_sessions,
        "configuration loaded"
    );

    let auth = JwtAuthenticator::from_env().context("loading JWT configuration")?;

    let storage = Storage::open(&config.storage()).context("opening storage")?;
    let services = Services::open(storage, auth, config.clone()).context("starting services")?;

    if let Some(path) = &config.users_file {
        let loaded = load_users(&services.directory, path)?;
        tracing::info!(loaded, path = %path.display(), "users loaded");
    }

    let sessions = services.state.sessions.clone();
    let app = create_router(services.state.clone());

    let listener = TcpListener::bind(&config.listen_address)
        .await
        .with_context(|| format!("binding {}", config.listen_address))?;
    tracing::info!(address = %config.listen_address, "server ready, accepting connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(sessions))
        .await?;

    let flushed = services.storage.flush().await?;
    tracing::info!(flushed_bytes = flushed, "server shutdown complete");
    Ok(())
}

/// Resolve on ctrl-c, closing every stream so in-flight responses can finish.
async fn shutdown_signal(sessions: Arc<SessionRegistry>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl+c");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
    sessions.shutdown_all();
}

fn load_users(directory: &SledUserDirectory, path: &Path) -> anyhow::Result<usize> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading users file {}", path.display()))?;
    let users: Vec<User> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing users file {}", path.display()))?;
    for user in &users {
        directory.upsert(user)?;
    }
    Ok(users.len())
}
