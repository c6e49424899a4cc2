pub mod adapters;
mod app;
pub mod auth;
pub mod config;
pub mod listener;
pub mod ports;
pub mod push;
pub mod realtime;
pub mod shell;
pub mod state;
pub mod store;
pub mod types;

pub use app::{StartupError, app, build_state};
pub use push::vapid::{VapidCredentials, generate_vapid_credentials};

use crate::adapters::{HeadlessHost, HttpNetwork, LogPresenter};
use crate::listener::ChangeFeedListener;
use crate::shell::cache::MemoryCacheStorage;
use crate::shell::{CacheShell, ShellConfig, ShellError};
use std::io;

const FEED_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("server io error: {0}")]
    Io(#[from] io::Error),
    #[error("no database configured")]
    MissingBackend,
    #[error("cache shell failed: {0}")]
    Shell(#[from] ShellError),
    #[error("cache shell task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub async fn serve(config: config::AppConfig) -> Result<(), ServeError> {
    let addr = config.bind;
    let state = build_state(config)?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Follows new chat messages for one user and presents them as log lines
/// until interrupted.
pub async fn listen(
    config: config::AppConfig,
    user_id: &str,
    visible: bool,
) -> Result<(), ServeError> {
    let backend = config.backend.as_ref().ok_or(ServeError::MissingBackend)?;
    let directory = store::RestBackend::new(&backend.database_url, &backend.service_key)
        .map_err(StartupError::from)?;
    let feed = realtime::spawn_feed(
        realtime::RealtimeConfig {
            project_url: backend.database_url.clone(),
            api_key: backend.service_key.clone(),
        },
        FEED_CAPACITY,
    );

    let listener = ChangeFeedListener::new(directory, LogPresenter { visible });
    let subscription = listener.subscribe(user_id, feed);
    shutdown_signal().await;
    subscription.unsubscribe();
    Ok(())
}

/// Runs install and activate of the offline shell against a live deployment
/// and returns how many assets ended up cached.
pub async fn precache(shell_config: ShellConfig) -> Result<usize, ServeError> {
    let cache_name = shell_config.cache_name.clone();
    let network = HttpNetwork::new(shell_config.origin.clone());
    let cache = MemoryCacheStorage::default();
    let shell = CacheShell::new(shell_config, cache.clone(), network, HeadlessHost);

    shell.install().settled().await??;
    shell.activate().settled().await??;
    Ok(cache.entry_count(&cache_name))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
