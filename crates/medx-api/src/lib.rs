//! # medx-api: HTTP Service for the Directive Engine
//!
//! ## API Surface
//!
//! | Prefix                      | Module                     | Auth |
//! |-----------------------------|----------------------------|------|
//! | `/v1/directives/*`          | [`routes::directives`]     | yes  |
//! | `/v1/extract`               | [`routes::extract`]        | yes  |
//! | `/v1/emergency/resolve`     | [`routes::emergency`]      | yes  |
//! | `/v1/executions/*`          | [`routes::executions`]     | yes  |
//! | `/health/*`, `/metrics`     | this module                | no   |
//! | `/openapi.json`             | [`openapi`]                | no   |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → Handler
//! ```
//!
//! Raw patient identifiers are hashed at the handler boundary. Nothing
//! downstream of a handler, logs included, sees them.

pub mod auth;
pub mod config;
pub mod error;
pub mod extractors;
pub mod intake;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::state::AppState;

/// Largest accepted request body. Directive statements are short prose.
const MAX_BODY_BYTES: usize = 256 * 1024;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes, `/metrics` and `/openapi.json` are mounted outside the
/// auth middleware so they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };

    // Authenticated API routes.
    let api = Router::new()
        .merge(routes::directives::router())
        .merge(routes::extract::router())
        .merge(routes::emergency::router())
        .merge(routes::executions::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(from_fn(auth::auth_middleware))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(auth_config))
        .with_state(state.clone());

    // Unauthenticated probes and documents.
    let public = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(render_metrics))
        .merge(openapi::router())
        .with_state(state);

    Router::new().merge(public).merge(api)
}

/// Liveness probe: 200 while the process runs.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 503 if the audit hash chain no longer verifies.
async fn readiness(State(state): State<AppState>) -> Response {
    match state.store.audit_log().verify_chain() {
        Ok(()) => (StatusCode::OK, "ready").into_response(),
        Err(e) => {
            tracing::error!(error = %e, "audit chain verification failed");
            (StatusCode::SERVICE_UNAVAILABLE, "audit chain broken").into_response()
        }
    }
}

/// Prometheus text exposition. 503 when no recorder is installed.
async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}
