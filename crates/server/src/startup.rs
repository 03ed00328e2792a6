use std::net::SocketAddr;

use common::env::ensure_parent_dir;
use configs::{AppConfig, ServerConfig};
use service::auth::{AuthRoutes, AuthService};
use service::storage::{JsonStore, StoreConfig};
use tracing::{info, warn};

use crate::routes;
use crate::routes::auth::ServerState;

/// Open the user directory and wire it into fresh server state.
pub async fn build_state(store: &StoreConfig, paths: AuthRoutes) -> anyhow::Result<ServerState> {
    ensure_parent_dir(&store.filename).await?;
    let directory = JsonStore::from_config(store);
    directory.init().await?;
    let users = directory.len().await?;
    info!(path = %directory.filename().display(), users, auto_save = directory.auto_save(), "user directory loaded");
    if !directory.auto_save() {
        warn!("auto_save is off: the user directory is written on shutdown only");
    }
    Ok(ServerState::new(AuthService::new(std::sync::Arc::new(directory), paths)))
}

fn bind_addr(server: &ServerConfig) -> anyhow::Result<SocketAddr> {
    Ok(format!("{}:{}", server.host, server.port).parse()?)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("received Ctrl+C, shutting down");
    }
}

/// Public entry: build the app and run the HTTP server until Ctrl+C
pub async fn run(cfg: AppConfig) -> anyhow::Result<()> {
    let state = build_state(&cfg.store, cfg.auth.clone()).await?;
    let directory = std::sync::Arc::clone(state.auth.directory());
    let app = routes::build_router(state);

    let addr = bind_addr(&cfg.server)?;
    info!(%addr, "starting server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if !directory.auto_save() {
        directory.save().await?;
        info!(path = %directory.filename().display(), "user directory saved");
    }
    Ok(())
}
