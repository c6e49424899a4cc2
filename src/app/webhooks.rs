use crate::auth::Caller;
use crate::ports::directory::Directory;
use crate::state;

use axum::Extension;
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use serde::Serialize;

use super::push::{ErrorResponse, api_error};

const LOST_STATUS: &str = "lost";

#[derive(Debug, Deserialize)]
struct LostPetEvent {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    record: Option<PetRecord>,
}

#[derive(Debug, Deserialize)]
struct PetRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    province: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) struct WebhookResponse {
    pub(crate) message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) candidates: Option<usize>,
}

impl WebhookResponse {
    fn ignored() -> Self {
        Self {
            message: "Ignored".to_string(),
            candidates: None,
        }
    }
}

/// Province of a freshly inserted lost-pet record, if the event is one.
fn lost_pet_province(body: &[u8]) -> Option<(PetRecord, String)> {
    let event: LostPetEvent = serde_json::from_slice(body).ok()?;
    if !event.kind.eq_ignore_ascii_case("INSERT") {
        return None;
    }
    let record = event.record?;
    let is_lost = record
        .status
        .as_deref()
        .is_some_and(|status| status.trim().eq_ignore_ascii_case(LOST_STATUS));
    if !is_lost {
        return None;
    }
    let province = record
        .province
        .as_deref()
        .map(str::trim)
        .filter(|province| !province.is_empty())?
        .to_string();
    Some((record, province))
}

/// Receives database webhooks for the pets table. Only identifies which users
/// share the lost pet's province; nothing is delivered from here.
pub(crate) async fn lost_pets(
    State(state): State<state::AppState>,
    Extension(caller): Extension<Caller>,
    body: Bytes,
) -> Result<Json<WebhookResponse>, (StatusCode, Json<ErrorResponse>)> {
    if !caller.is_service() {
        return Err(api_error(StatusCode::FORBIDDEN, "forbidden"));
    }
    let Some((record, province)) = lost_pet_province(&body) else {
        return Ok(Json(WebhookResponse::ignored()));
    };

    let candidates = state
        .store
        .profiles_in_province(&province)
        .await
        .map_err(|err| {
            tracing::error!(province = %province, error = %err, "failed to look up province profiles");
            api_error(StatusCode::BAD_GATEWAY, "Failed to look up profiles.")
        })?;

    tracing::info!(
        pet_id = record.id.as_deref().unwrap_or("-"),
        pet_name = record.name.as_deref().unwrap_or("-"),
        province = %province,
        candidates = candidates.len(),
        "lost pet reported"
    );
    for profile in &candidates {
        tracing::debug!(user_id = %profile.id, province = %province, "lost pet alert candidate");
    }

    Ok(Json(WebhookResponse {
        message: format!(
            "Found {} users in {province} to notify.",
            candidates.len()
        ),
        candidates: Some(candidates.len()),
    }))
}
