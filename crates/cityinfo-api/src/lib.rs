//! # cityinfo-api: Versioned City Info HTTP Service
//!
//! Read and manage cities and their points of interest over a versioned,
//! content-negotiated HTTP API protected by bearer tokens.
//!
//! ## API Surface
//!
//! | Prefix                                      | Module                        | Versions |
//! |---------------------------------------------|-------------------------------|----------|
//! | `/api/v{v}/cities`                          | [`routes::cities`]            | 1.0, 2.0 |
//! | `/api/v{v}/cities/{id}/pointsofinterest`    | [`routes::points_of_interest`]| 2.0      |
//! | `/swagger`, `/swagger/{group}/swagger.json` | [`openapi`]                   | n/a      |
//! | `/health/liveness`, `/health/readiness`     | this module                   | n/a      |
//!
//! ## Request Pipeline (execution order)
//!
//! ```text
//! Diagnostics scope → Forwarded headers → TraceLayer → Version resolution
//!   → routing → Version binding → Authentication → Authorization → Handler
//! ```
//!
//! Version resolution runs before routing because it rewrites
//! `/api/...` paths to their canonical `/api/v{major}` form.

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod extractors;
pub mod mail;
pub mod mapping;
pub mod middleware;
pub mod models;
pub mod negotiation;
pub mod openapi;
pub mod policy;
pub mod routes;
pub mod state;
pub mod versioning;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;

use crate::diagnostics::scope_request;
use crate::error::AppError;
use crate::middleware::forwarded::forwarded_headers;
use crate::state::AppState;
use crate::versioning::resolve_api_version;

/// Assemble the full application with all routes and middleware.
///
/// Health probes are mounted outside the per-route pipeline so they remain
/// accessible without credentials.
pub fn app(state: AppState) -> Router {
    let health = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness));

    let routed = Router::new()
        .merge(openapi::router())
        .merge(routes::api_router(&state))
        .fallback(not_found)
        .with_state(state.clone())
        .merge(health);

    let pipeline = ServiceBuilder::new()
        .layer(from_fn_with_state(state.diagnostics.clone(), scope_request))
        .layer(from_fn(forwarded_headers))
        .layer(middleware::tracing_layer::layer())
        .layer(from_fn_with_state(state.versions.clone(), resolve_api_version))
        .service(routed);

    Router::new().fallback_service(pipeline)
}

/// Liveness probe: 200 while the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 200 once the state has been assembled.
async fn readiness() -> &'static str {
    "ready"
}

async fn not_found() -> AppError {
    AppError::NotFound("No resource matches the request URI.".to_string())
}
