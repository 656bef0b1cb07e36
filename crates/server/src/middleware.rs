//! HTTP middleware: correlation ids, request logging, bearer authentication
//! and dependency-failure translation.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use quotes_storage::QuoteStorage;

use crate::error::{ApiError, DependencyFailure};
use crate::state::AppState;

pub(crate) static CORRELATION_ID_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");

const MAX_CORRELATION_ID_LEN: usize = 128;

/// The correlation id of the current request, available as a request extension.
#[derive(Debug, Clone)]
pub(crate) struct CorrelationId(pub(crate) String);

/// Echo the caller's `X-Correlation-Id`, or mint one, and attach it to both
/// the request extensions and the response headers.
pub(crate) async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let id = request
        .headers()
        .get(&CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_CORRELATION_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

    request.extensions_mut().insert(CorrelationId(id.clone()));
    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response
            .headers_mut()
            .insert(CORRELATION_ID_HEADER.clone(), value);
    }
    response
}

/// Log one line per completed request.
pub(crate) async fn request_logging_middleware(
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let correlation_id = request
        .extensions()
        .get::<CorrelationId>()
        .map(|c| c.0.clone())
        .unwrap_or_default();
    let started = Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        correlation_id = %correlation_id,
        "request completed"
    );
    response
}

/// Bearer token authentication for the `/api` routes.
pub(crate) async fn auth_middleware<S: QuoteStorage>(
    State(state): State<Arc<AppState<S>>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token);

    match token {
        Some(token) if state.accepts_token(token) => next.run(request).await,
        _ => ApiError::Unauthorized.into_response(),
    }
}

/// Token from an `Authorization` value. The scheme name is case-insensitive.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|token| !token.is_empty())
}

/// Add `Retry-After` to responses caused by an unavailable store and count them.
pub(crate) async fn dependency_failure_middleware<S: QuoteStorage>(
    State(state): State<Arc<AppState<S>>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    if response.extensions().get::<DependencyFailure>().is_some() {
        state.metrics.db_unavailable();
        response.headers_mut().insert(
            axum::http::header::RETRY_AFTER,
            HeaderValue::from(state.retry_after_secs),
        );
    }
    response
}
