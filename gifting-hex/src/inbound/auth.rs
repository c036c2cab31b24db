//! API key authentication.
//!
//! Resolves the bearer key to its owner and stores an
//! [`AuthenticatedOwner`] in the request extensions. Only mounted on the
//! owner-scoped routes: health, the OpenAPI document and gateway callbacks
//! never pass through here.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};

use gifting_repo::security::hash_api_key;
use gifting_types::LedgerStore;

use super::handlers::{AppState, AuthenticatedOwner};

/// Extracts the API key from the Authorization header.
/// Accepts "Bearer <api_key>" or the bare key.
fn extract_api_key(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;
    Some(header.strip_prefix("Bearer ").unwrap_or(header).trim())
}

pub async fn auth_middleware<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let api_key = match extract_api_key(auth_header) {
        Some(key) if !key.is_empty() => key,
        _ => return unauthorized_response("Missing or invalid Authorization header"),
    };

    let key_hash = hash_api_key(api_key);

    match state.service.store().find_owner_by_api_key(&key_hash).await {
        Ok(Some(owner_id)) => {
            request
                .extensions_mut()
                .insert(AuthenticatedOwner(owner_id));
            next.run(request).await
        }
        Ok(None) => unauthorized_response("Invalid API key"),
        Err(e) => {
            tracing::error!(error = %e, "API key lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "internal server error",
                    "code": 500
                })),
            )
                .into_response()
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": message,
            "code": 401
        })),
    )
        .into_response()
}
