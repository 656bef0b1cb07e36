//! API error responses.
//!
//! Every failure body is `{"code": ..., "message": ...}`; validation failures
//! add an `errors` map and dependency failures add the `correlationId`.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use quotes_core::{KeyError, IDEMPOTENCY_KEY_REUSE_CONFLICT, IDEMPOTENCY_KEY_REUSE_MESSAGE};

/// Response extension marking a failure caused by an unavailable dependency.
/// The dependency-failure middleware adds `Retry-After` to such responses.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DependencyFailure;

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized,
    IdempotencyKey(KeyError),
    InvalidIdempotencyKey,
    Validation(BTreeMap<String, Vec<String>>),
    PayloadTooLarge,
    KeyReuseConflict,
    StoreUnavailable { correlation_id: String },
    Internal,
    NotFound,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::IdempotencyKey(_)
            | ApiError::InvalidIdempotencyKey
            | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::KeyReuseConflict => StatusCode::CONFLICT,
            ApiError::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound => StatusCode::NOT_FOUND,
        }
    }

    pub(crate) fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::IdempotencyKey(KeyError::Missing) => "IDEMPOTENCY_KEY_REQUIRED",
            ApiError::IdempotencyKey(KeyError::TooLong { .. }) => "IDEMPOTENCY_KEY_TOO_LONG",
            ApiError::InvalidIdempotencyKey => "IDEMPOTENCY_KEY_INVALID",
            ApiError::Validation(_) => "VALIDATION_FAILED",
            ApiError::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ApiError::KeyReuseConflict => IDEMPOTENCY_KEY_REUSE_CONFLICT,
            ApiError::StoreUnavailable { .. } => "DB_UNAVAILABLE",
            ApiError::Internal => "INTERNAL_ERROR",
            ApiError::NotFound => "NOT_FOUND",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Unauthorized => "A valid bearer token is required.".to_string(),
            ApiError::IdempotencyKey(e) => e.to_string(),
            ApiError::InvalidIdempotencyKey => {
                "Idempotency-Key header must be valid UTF-8.".to_string()
            }
            ApiError::Validation(_) => "One or more fields are invalid.".to_string(),
            ApiError::PayloadTooLarge => "Request body is too large.".to_string(),
            ApiError::KeyReuseConflict => IDEMPOTENCY_KEY_REUSE_MESSAGE.to_string(),
            ApiError::StoreUnavailable { .. } => {
                "The database is temporarily unavailable. Retry later.".to_string()
            }
            ApiError::Internal => "An unexpected error occurred.".to_string(),
            ApiError::NotFound => "not found".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "code": self.code(),
            "message": self.message(),
        });
        match &self {
            ApiError::Validation(errors) => body["errors"] = json!(errors),
            ApiError::StoreUnavailable { correlation_id } => {
                body["correlationId"] = json!(correlation_id)
            }
            _ => {}
        }

        let mut response = (self.status(), Json(body)).into_response();
        if matches!(self, ApiError::StoreUnavailable { .. }) {
            response.extensions_mut().insert(DependencyFailure);
        }
        response
    }
}
