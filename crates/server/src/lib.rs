//! quotes-server: the HTTP surface of the quotes API.
//!
//! Endpoints:
//! - POST /api/v1/quotes  - Idempotent quote creation (bearer auth required)
//! - GET  /health         - Store reachability (exempt from auth)
//! - GET  /metrics        - Prometheus counters (exempt from auth)
//!
//! Every response carries `X-Correlation-Id`. Failures caused by an
//! unavailable store are answered with 503 and `Retry-After`.

pub mod config;
mod error;
mod handlers;
pub mod metrics;
mod middleware;
pub mod state;
mod validate;

use std::future::Future;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Router};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use quotes_storage::QuoteStorage;

pub use config::{Cli, ConfigError, ServerConfig};
pub use metrics::{CounterMetrics, MetricsError};
pub use state::AppState;

use self::handlers::{handle_create_quote, handle_health, handle_metrics, handle_not_found};
use self::middleware::{
    auth_middleware, correlation_id_middleware, dependency_failure_middleware,
    request_logging_middleware,
};

/// Build the application router over the given state.
///
/// Layers, outermost first: body limit, CORS, correlation id, request
/// logging, dependency-failure translation. Auth wraps only `/api` routes.
pub fn build_router<S: QuoteStorage>(state: Arc<AppState<S>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .expose_headers(Any);

    let api = Router::new()
        .route("/api/v1/quotes", post(handle_create_quote::<S>))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware::<S>,
        ));

    Router::new()
        .route("/health", get(handle_health::<S>))
        .route("/metrics", get(handle_metrics::<S>))
        .merge(api)
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            dependency_failure_middleware::<S>,
        ))
        .layer(axum_middleware::from_fn(request_logging_middleware))
        .layer(axum_middleware::from_fn(correlation_id_middleware))
        .layer(cors)
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .with_state(state)
}

/// Serve the router on `listener` until `shutdown` resolves.
pub async fn serve<S, F>(
    listener: TcpListener,
    state: Arc<AppState<S>>,
    shutdown: F,
) -> std::io::Result<()>
where
    S: QuoteStorage,
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
