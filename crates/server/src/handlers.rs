//! HTTP route handlers: health, metrics, quote creation.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use quotes_core::{
    CreateQuoteCommand, CreateQuoteOutcome, CreateQuoteRequest, IdempotencyKey, IdempotencyStatus,
};
use quotes_storage::QuoteStorage;

use crate::error::ApiError;
use crate::middleware::CorrelationId;
use crate::state::AppState;
use crate::validate::validate_body;

pub(crate) const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
pub(crate) const IDEMPOTENCY_STATUS_HEADER: &str = "idempotency-status";

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    ApiError::NotFound
}

/// GET /health
pub(crate) async fn handle_health<S: QuoteStorage>(
    State(state): State<Arc<AppState<S>>>,
) -> impl IntoResponse {
    let ping = tokio::time::timeout(state.store_timeout, state.quotes.storage().ping()).await;
    match ping {
        Ok(Ok(())) => (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "health check: store ping failed");
            unavailable()
        }
        Err(_) => {
            tracing::warn!("health check: store ping timed out");
            unavailable()
        }
    }
}

fn unavailable() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({"status": "unavailable"})),
    )
}

/// GET /metrics
pub(crate) async fn handle_metrics<S: QuoteStorage>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Response, ApiError> {
    let text = state.metrics.encode_text().map_err(|e| {
        tracing::error!(error = %e, "failed to encode metrics");
        ApiError::Internal
    })?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], text).into_response())
}

/// Read the `Idempotency-Key` header. Any UTF-8 text is accepted, not just
/// visible ASCII; bytes that are not UTF-8 are rejected rather than treated
/// as a missing key.
fn idempotency_key(headers: &HeaderMap) -> Result<IdempotencyKey, ApiError> {
    let raw = match headers.get(IDEMPOTENCY_KEY_HEADER) {
        Some(value) => std::str::from_utf8(value.as_bytes())
            .map_err(|_| ApiError::InvalidIdempotencyKey)?,
        None => "",
    };
    IdempotencyKey::parse(raw).map_err(ApiError::IdempotencyKey)
}

/// POST /api/v1/quotes
///
/// The idempotency key is checked before the body, so a request missing
/// both reports the missing key.
pub(crate) async fn handle_create_quote<S: QuoteStorage>(
    State(state): State<Arc<AppState<S>>>,
    Extension(correlation): Extension<CorrelationId>,
    headers: HeaderMap,
    body: Result<Json<CreateQuoteRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let idempotency_key = idempotency_key(&headers)?;
    let request = validate_body(body)?;

    let command = CreateQuoteCommand {
        idempotency_key,
        request,
    };
    let outcome = state.quotes.create(&command).await.map_err(|e| {
        if e.is_store_unavailable() {
            ApiError::StoreUnavailable {
                correlation_id: correlation.0.clone(),
            }
        } else {
            tracing::error!(
                error = %e,
                correlation_id = %correlation.0,
                "create quote failed"
            );
            ApiError::Internal
        }
    })?;

    let (status, stored) = match outcome {
        CreateQuoteOutcome::Created(r) => (IdempotencyStatus::Created, r),
        CreateQuoteOutcome::Replayed(r) => (IdempotencyStatus::Replayed, r),
        CreateQuoteOutcome::Conflict => return Err(ApiError::KeyReuseConflict),
    };
    let code = StatusCode::from_u16(stored.status).map_err(|_| {
        tracing::error!(status = stored.status, "stored response has an invalid status");
        ApiError::Internal
    })?;

    Ok((
        code,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            ),
            (
                header::HeaderName::from_static(IDEMPOTENCY_STATUS_HEADER),
                HeaderValue::from_static(status.as_str()),
            ),
        ],
        stored.body,
    )
        .into_response())
}
