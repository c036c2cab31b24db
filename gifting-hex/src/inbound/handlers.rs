//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use utoipa::OpenApi;

use gifting_repo::security::SIGNATURE_HEADER;
use gifting_types::{
    AppError, CatalogEntryId, CheckoutRequest, CreditCheckoutRequest, ItemId, ItemResponse,
    LedgerStore, OwnerId, PurchaseRequest, TransactionResponse, WebhookAck,
};

use super::webhook_guard::SignatureFailureTracker;
use crate::GiftingService;
use crate::openapi::ApiDoc;

/// Application state shared across handlers.
pub struct AppState<S: LedgerStore> {
    pub service: GiftingService<S>,
    pub signature_failures: SignatureFailureTracker,
}

/// Owner resolved from the API key by the auth middleware.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedOwner(pub OwnerId);

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, mut body) = match &self.0 {
            AppError::InsufficientBalance {
                required,
                available,
            } => (
                StatusCode::PAYMENT_REQUIRED,
                json!({
                    "error": "insufficient_balance",
                    "required": required,
                    "available": available,
                }),
            ),
            AppError::WalletNotFound => (
                StatusCode::PAYMENT_REQUIRED,
                json!({ "error": "wallet_not_found" }),
            ),
            AppError::CatalogEntryNotFound => (
                StatusCode::NOT_FOUND,
                json!({ "error": "catalog_entry_not_found" }),
            ),
            AppError::InvalidAmount(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": "invalid_amount", "message": msg }),
            ),
            AppError::GatewayUnavailable(detail) => {
                tracing::error!(detail = %detail, "Payment gateway unavailable");
                (
                    StatusCode::BAD_GATEWAY,
                    json!({ "error": "could not start payment" }),
                )
            }
            AppError::InvalidSignature => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "invalid_signature" }),
            ),
            AppError::AlreadySettled => (
                StatusCode::CONFLICT,
                json!({ "error": "already_settled" }),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            AppError::Internal(detail) => {
                tracing::error!(detail = %detail, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal server error" }),
                )
            }
        };

        body["code"] = json!(status.as_u16());

        (status, Json(body)).into_response()
    }
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

/// Serves the OpenAPI document.
pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

fn parse_id<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError(AppError::BadRequest(format!("Invalid {}", what))))
}

/// Spend credits on a catalog entry.
#[tracing::instrument(skip(state, req), fields(owner_id = %owner, catalog_entry_id = %id))]
pub async fn purchase<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(AuthenticatedOwner(owner)): Extension<AuthenticatedOwner>,
    Path(id): Path<String>,
    Json(req): Json<PurchaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let entry_id: CatalogEntryId = parse_id(&id, "catalog entry ID")?;

    let item = state.service.settle(owner, entry_id, req.target_id).await?;
    Ok((StatusCode::CREATED, Json(ItemResponse::from(item))))
}

/// Open a donation checkout.
#[tracing::instrument(skip(state, req), fields(owner_id = %owner, amount = req.amount))]
pub async fn checkout<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(AuthenticatedOwner(owner)): Extension<AuthenticatedOwner>,
    Json(req): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state
        .service
        .initiate_checkout(owner, req.target_id, req.amount)
        .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Open a checkout for a credit bundle.
#[tracing::instrument(skip(state, req), fields(owner_id = %owner, bundle_id = %req.bundle_id))]
pub async fn credit_checkout<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(AuthenticatedOwner(owner)): Extension<AuthenticatedOwner>,
    Json(req): Json<CreditCheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state
        .service
        .initiate_credit_purchase(owner, req.bundle_id)
        .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Gateway callback. Authenticated by signature, not by API key.
#[tracing::instrument(skip(state, headers, body), fields(source))]
pub async fn payment_webhook<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let source = callback_source(&headers);
    tracing::Span::current().record("source", source.as_str());

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.service.reconcile(&body, signature).await {
        Ok(outcome) => {
            state.signature_failures.clear(&source);
            tracing::debug!(outcome = %outcome, "Gateway callback handled");
            Ok(Json(WebhookAck { received: true }))
        }
        Err(AppError::InvalidSignature) => {
            state.signature_failures.record_failure(&source);
            Err(AppError::InvalidSignature.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Best-known origin of a callback, for failure accounting.
fn callback_source(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Balance of the caller's ledger.
#[tracing::instrument(skip(state), fields(owner_id = %owner))]
pub async fn get_ledger<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(AuthenticatedOwner(owner)): Extension<AuthenticatedOwner>,
) -> Result<impl IntoResponse, ApiError> {
    let ledger = state.service.get_ledger(owner).await?;
    Ok(Json(ledger))
}

/// The caller's ledger history, newest first.
#[tracing::instrument(skip(state), fields(owner_id = %owner))]
pub async fn list_transactions<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(AuthenticatedOwner(owner)): Extension<AuthenticatedOwner>,
) -> Result<impl IntoResponse, ApiError> {
    let transactions: Vec<TransactionResponse> = state
        .service
        .list_transactions(owner)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(transactions))
}

#[tracing::instrument(skip(state), fields(owner_id = %owner, item_id = %id))]
pub async fn get_item<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(AuthenticatedOwner(owner)): Extension<AuthenticatedOwner>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let item_id: ItemId = parse_id(&id, "item ID")?;

    let item = state.service.get_item(owner, item_id).await?;
    Ok(Json(ItemResponse::from(item)))
}
