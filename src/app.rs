use crate::auth as auth_service;
use crate::config;
use crate::state;
use crate::store;

use axum::Router;
use axum::middleware;
use axum::routing::delete;
use axum::routing::get;
use axum::routing::post;
use tower_http::trace::TraceLayer;

mod auth;
mod push;
mod webhooks;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid auth configuration: {0}")]
    Auth(#[from] auth_service::AuthError),
    #[error("invalid backend configuration: {0}")]
    Store(#[from] store::StoreError),
}

/// Resolves the configured backends. Without a database URL subscriptions
/// live in memory for the lifetime of the process and push dispatch is
/// refused.
pub fn build_state(config: config::AppConfig) -> Result<state::AppState, StartupError> {
    let auth = auth_service::AuthState::from_config(&config)?;
    let store = match config.backend.as_ref() {
        Some(backend) => {
            store::Store::Rest(store::RestBackend::new(&backend.database_url, &backend.service_key)?)
        }
        None => {
            tracing::warn!("no database configured; subscriptions are kept in memory and push dispatch is disabled");
            store::Store::default()
        }
    };
    if auth.is_none() {
        tracing::warn!("no auth secret configured; API routes are unrestricted");
    }
    Ok(state::AppState {
        config,
        auth,
        store,
    })
}

pub fn app(state: state::AppState) -> Router {
    Router::new()
        .route("/api/push/send", post(push::push_send))
        .route("/api/push/public-key", get(push::push_public_key))
        .route("/api/push/subscriptions", post(push::push_subscribe))
        .route(
            "/api/push/users/{user_id}/subscriptions",
            get(push::push_subscriptions),
        )
        .route(
            "/api/push/users/{user_id}/subscriptions/{subscription_id}",
            delete(push::push_unsubscribe),
        )
        .route("/api/webhooks/lost-pets", post(webhooks::lost_pets))
        .route("/health", get(health))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(state, auth::auth_middleware))
        .layer(TraceLayer::new_for_http())
}

pub(crate) async fn health() -> &'static str {
    "ok"
}
