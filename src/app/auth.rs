use crate::auth::Caller;
use crate::state;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::Request;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Serialize)]
struct AuthErrorResponse {
    error: &'static str,
}

/// Attaches a [`Caller`] to every request. Without auth configured every
/// caller is unrestricted.
pub(crate) async fn auth_middleware(
    State(state): State<state::AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(auth) = &state.auth else {
        req.extensions_mut().insert(Caller::unrestricted());
        return next.run(req).await;
    };

    if is_auth_bypass_path(req.uri().path()) {
        req.extensions_mut().insert(Caller {
            subject: None,
            role: None,
        });
        return next.run(req).await;
    }

    let caller = bearer_token(req.headers()).and_then(|token| match auth.verify_token(token) {
        Ok(caller) => Some(caller),
        Err(err) => {
            tracing::debug!(error = %err, "rejected bearer token");
            None
        }
    });
    let Some(caller) = caller else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(AuthErrorResponse {
                error: "unauthorized",
            }),
        )
            .into_response();
    };

    req.extensions_mut().insert(caller);
    next.run(req).await
}

fn is_auth_bypass_path(path: &str) -> bool {
    path == "/health" || path == "/api/push/public-key"
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = raw.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
