use crate::ports::push::{DeliveryError, PushSender};
use crate::ports::registry::SubscriptionRegistry;
use crate::types::push::{PushPayload, PushSubscription};

pub(crate) mod vapid;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;

pub use vapid::{VapidConfigStatus, load_vapid_config};

pub const DEFAULT_TITLE: &str = "Huellas Digitales";
pub const DEFAULT_BODY: &str = "Tienes una nueva notificación";
pub const DEFAULT_URL: &str = "/";
pub const DEFAULT_ICON: &str = "/icons/icon-192x192.png";
pub const DEFAULT_BADGE: &str = "/icons/badge-72x72.png";

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchRequest {
    pub user_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub sent: usize,
    pub total: usize,
    pub pruned: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to load subscriptions: {0}")]
    Registry(String),
    #[error("failed to encode payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Delivered,
    Failed,
    Gone,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub(crate) fn build_payload(
    request: &DispatchRequest,
    default_title: &str,
    now: OffsetDateTime,
) -> PushPayload {
    PushPayload {
        title: non_blank(request.title.as_deref())
            .or(non_blank(Some(default_title)))
            .unwrap_or(DEFAULT_TITLE)
            .to_string(),
        body: non_blank(request.body.as_deref())
            .unwrap_or(DEFAULT_BODY)
            .to_string(),
        icon: Some(DEFAULT_ICON.to_string()),
        badge: Some(DEFAULT_BADGE.to_string()),
        url: Some(
            non_blank(request.url.as_deref())
                .unwrap_or(DEFAULT_URL)
                .to_string(),
        ),
        timestamp: Some((now.unix_timestamp_nanos() / 1_000_000) as i64),
    }
}

/// Delivers one message to every endpoint registered for the user.
///
/// Attempts run concurrently and fail independently. Endpoints the provider
/// reports as gone are removed from the registry; any other failure (including
/// hitting `timeout`) leaves the endpoint in place. `default_title` (the
/// configured app name) is used when the request carries no title.
pub async fn dispatch_with_sender<S, R>(
    sender: &S,
    registry: &R,
    request: &DispatchRequest,
    default_title: &str,
    timeout: Duration,
) -> Result<DispatchReport, DispatchError>
where
    S: PushSender,
    R: SubscriptionRegistry,
{
    let subscriptions = registry
        .list_for_user(&request.user_id)
        .await
        .map_err(|err| DispatchError::Registry(err.to_string()))?;
    if subscriptions.is_empty() {
        tracing::info!(user_id = %request.user_id, "no push subscriptions registered");
        return Ok(DispatchReport::default());
    }

    let payload = build_payload(request, default_title, OffsetDateTime::now_utc());
    let payload = serde_json::to_vec(&payload)?;
    let attempts = join_all(
        subscriptions
            .iter()
            .map(|subscription| attempt(sender, registry, subscription, &payload, timeout)),
    )
    .await;

    let report = DispatchReport {
        sent: attempts.iter().filter(|a| **a == Attempt::Delivered).count(),
        total: attempts.len(),
        pruned: attempts.iter().filter(|a| **a == Attempt::Gone).count(),
    };
    tracing::info!(
        user_id = %request.user_id,
        sent = report.sent,
        total = report.total,
        pruned = report.pruned,
        "push dispatch finished"
    );
    Ok(report)
}

async fn attempt<S, R>(
    sender: &S,
    registry: &R,
    subscription: &PushSubscription,
    payload: &[u8],
    timeout: Duration,
) -> Attempt
where
    S: PushSender,
    R: SubscriptionRegistry,
{
    let err = match tokio::time::timeout(timeout, sender.send(subscription, payload)).await {
        Ok(Ok(())) => return Attempt::Delivered,
        Ok(Err(err)) => err,
        Err(_) => {
            tracing::warn!(
                subscription_id = %subscription.id,
                endpoint = %subscription.endpoint,
                "push delivery timed out after {timeout:?}"
            );
            return Attempt::Failed;
        }
    };

    if !err.is_gone() {
        tracing::warn!(
            subscription_id = %subscription.id,
            endpoint = %subscription.endpoint,
            error = %err,
            "push delivery failed"
        );
        return Attempt::Failed;
    }

    tracing::info!(
        subscription_id = %subscription.id,
        endpoint = %subscription.endpoint,
        "push endpoint gone, removing subscription"
    );
    if let Err(err) = registry.delete(&subscription.id).await {
        tracing::error!(
            subscription_id = %subscription.id,
            error = %err,
            "failed to remove gone subscription"
        );
    }
    Attempt::Gone
}
