use crate::adapters::WebPushSender;
use crate::auth::Caller;
use crate::ports::directory::Directory;
use crate::ports::registry::SubscriptionRegistry;
use crate::push as push_service;
use crate::state;
use crate::types::push::{NewSubscription, PushSubscription};

use axum::Extension;
use axum::Json;
use axum::extract::Path as AxumPath;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use reqwest::Url;
use serde::Deserialize;
use serde::Serialize;

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: &'static str,
}

pub(crate) fn api_error(status: StatusCode, error: &'static str) -> ApiError {
    (status, Json(ErrorResponse { error }))
}

#[derive(Serialize)]
pub(crate) struct PublicKeyResponse {
    #[serde(rename = "publicKey")]
    pub(crate) public_key: String,
}

pub(crate) async fn push_public_key(
    State(state): State<state::AppState>,
) -> Result<Json<PublicKeyResponse>, ApiError> {
    match push_service::load_vapid_config(&state.config) {
        push_service::VapidConfigStatus::Ready(vapid) => Ok(Json(PublicKeyResponse {
            public_key: vapid.public_key,
        })),
        push_service::VapidConfigStatus::Incomplete | push_service::VapidConfigStatus::Missing => {
            Err(api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "Push notifications are not configured.",
            ))
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SendResponse {
    pub(crate) message: String,
    pub(crate) sent: usize,
    pub(crate) total: usize,
}

pub(crate) async fn push_send(
    State(state): State<state::AppState>,
    request: Result<Json<push_service::DispatchRequest>, JsonRejection>,
) -> Result<Json<SendResponse>, ApiError> {
    let vapid = match push_service::load_vapid_config(&state.config) {
        push_service::VapidConfigStatus::Ready(vapid) => vapid,
        push_service::VapidConfigStatus::Incomplete | push_service::VapidConfigStatus::Missing => {
            tracing::error!("push dispatch refused: VAPID keys are not configured");
            return Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "VAPID keys are not configured.",
            ));
        }
    };
    if state.config.backend.is_none() {
        tracing::error!("push dispatch refused: database is not configured");
        return Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Database is not configured.",
        ));
    }

    let Json(request) = request.map_err(|rejection| {
        tracing::debug!(error = %rejection, "malformed push dispatch body");
        api_error(StatusCode::BAD_REQUEST, "Invalid request body.")
    })?;
    if request.user_id.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "user_id is required."));
    }
    match state.store.profile(&request.user_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            tracing::info!(user_id = %request.user_id, "push dispatch for unknown user");
            return Err(api_error(StatusCode::NOT_FOUND, "Unknown user."));
        }
        Err(err) => {
            tracing::error!(user_id = %request.user_id, error = %err, "failed to look up user");
            return Err(api_error(StatusCode::BAD_GATEWAY, "Failed to look up user."));
        }
    }

    let sender = WebPushSender::new(vapid).map_err(|err| {
        tracing::error!(error = %err, "failed to init web-push");
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to initialize push sender.",
        )
    })?;

    let report = push_service::dispatch_with_sender(
        &sender,
        &state.store,
        &request,
        &state.config.app_name,
        state.config.push_timeout,
    )
    .await
    .map_err(|err| {
        tracing::error!(user_id = %request.user_id, error = %err, "push dispatch failed");
        match err {
            push_service::DispatchError::Registry(_) => api_error(
                StatusCode::BAD_GATEWAY,
                "Failed to load push subscriptions.",
            ),
            push_service::DispatchError::Payload(_) => api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode notification.",
            ),
        }
    })?;

    let message = if report.total == 0 {
        "No push subscriptions for user.".to_string()
    } else {
        format!("Sent {} of {} notifications.", report.sent, report.total)
    };
    Ok(Json(SendResponse {
        message,
        sent: report.sent,
        total: report.total,
    }))
}

/// Shape of `PushSubscription.toJSON()` in the browser, plus the owner.
#[derive(Debug, Deserialize)]
pub(crate) struct SubscribeRequest {
    pub(crate) user_id: String,
    pub(crate) endpoint: String,
    pub(crate) keys: SubscriptionKeys,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscriptionKeys {
    pub(crate) p256dh: String,
    pub(crate) auth: String,
}

pub(crate) async fn push_subscribe(
    State(state): State<state::AppState>,
    Extension(caller): Extension<Caller>,
    request: Result<Json<SubscribeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PushSubscription>), ApiError> {
    let Json(request) =
        request.map_err(|_| api_error(StatusCode::BAD_REQUEST, "Invalid request body."))?;

    if request.user_id.trim().is_empty()
        || request.keys.p256dh.trim().is_empty()
        || request.keys.auth.trim().is_empty()
    {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "user_id, endpoint, p256dh, and auth are required.",
        ));
    }
    match Url::parse(request.endpoint.trim()) {
        Ok(url) if url.scheme() == "https" => {}
        _ => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "endpoint must be an https URL.",
            ));
        }
    }
    if !caller.may_act_for(&request.user_id) {
        return Err(api_error(StatusCode::FORBIDDEN, "forbidden"));
    }

    let row = state
        .store
        .upsert(NewSubscription {
            user_id: request.user_id.trim().to_string(),
            endpoint: request.endpoint.trim().to_string(),
            p256dh: request.keys.p256dh.trim().to_string(),
            auth: request.keys.auth.trim().to_string(),
        })
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "failed to store push subscription");
            api_error(StatusCode::BAD_GATEWAY, "Failed to store subscription.")
        })?;
    tracing::info!(user_id = %row.user_id, subscription_id = %row.id, "push subscription stored");
    Ok((StatusCode::CREATED, Json(row)))
}

pub(crate) async fn push_subscriptions(
    State(state): State<state::AppState>,
    Extension(caller): Extension<Caller>,
    AxumPath(user_id): AxumPath<String>,
) -> Result<Json<Vec<PushSubscription>>, ApiError> {
    if !caller.may_act_for(&user_id) {
        return Err(api_error(StatusCode::FORBIDDEN, "forbidden"));
    }
    let rows = state.store.list_for_user(&user_id).await.map_err(|err| {
        tracing::error!(user_id = %user_id, error = %err, "failed to list push subscriptions");
        api_error(StatusCode::BAD_GATEWAY, "Failed to load subscriptions.")
    })?;
    Ok(Json(rows))
}

/// Explicit opt-out of one device.
pub(crate) async fn push_unsubscribe(
    State(state): State<state::AppState>,
    Extension(caller): Extension<Caller>,
    AxumPath((user_id, subscription_id)): AxumPath<(String, String)>,
) -> Result<StatusCode, ApiError> {
    if !caller.may_act_for(&user_id) {
        return Err(api_error(StatusCode::FORBIDDEN, "forbidden"));
    }
    let rows = state.store.list_for_user(&user_id).await.map_err(|err| {
        tracing::error!(user_id = %user_id, error = %err, "failed to list push subscriptions");
        api_error(StatusCode::BAD_GATEWAY, "Failed to load subscriptions.")
    })?;
    if !rows.iter().any(|row| row.id == subscription_id) {
        return Err(api_error(StatusCode::NOT_FOUND, "not found"));
    }

    state.store.delete(&subscription_id).await.map_err(|err| {
        tracing::error!(subscription_id = %subscription_id, error = %err, "failed to delete push subscription");
        api_error(StatusCode::BAD_GATEWAY, "Failed to delete subscription.")
    })?;
    tracing::info!(user_id = %user_id, subscription_id = %subscription_id, "push subscription removed");
    Ok(StatusCode::NO_CONTENT)
}
