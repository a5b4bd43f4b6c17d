//! Accord server library: configuration, the embedded API schema, and the
//! HTTP router.

pub mod api_schema;
pub mod config;

use accord_datastore::{Context, Datastore};
use axum::{
    extract::{DefaultBodyLimit, Extension},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

/// Health requests carry no body.
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// How long the health probe waits on the datastore.
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared application state.
pub struct AppState {
    pub datastore: Datastore,
}

/// Handler for `GET /health`.
///
/// Returns `200 OK` when the datastore answers a ping within the probe
/// timeout and `503 Service Unavailable` otherwise.
async fn health(Extension(state): Extension<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let ctx = Context::with_timeout(HEALTH_PROBE_TIMEOUT);
    let (status, database) = match state.datastore.ping(&ctx).await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::warn!(error = %e, "datastore health probe failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };

    let body = json!({
        "status": if status == StatusCode::OK { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.datastore.backend().as_str(),
        "database": database,
        "api_schema_version": api_schema::api_schema_version().ok(),
    });

    (status, Json(body))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
