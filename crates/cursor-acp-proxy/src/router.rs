//! HTTP surface served by the proxy.

use axum::{
    Json, Router,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

/// Health-check response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
}

/// Build the proxy router.
///
/// `GET {health_check_path}` answers `{"ok": true}`. Every other path or
/// method, `HEAD` included, is a plain 404. The path must already be
/// validated by [`ProxyConfig::validate`](crate::ProxyConfig::validate).
#[must_use]
pub fn create_router(health_check_path: &str) -> Router {
    Router::new()
        .route(health_check_path, get(health).fallback(not_found))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
}

// axum dispatches HEAD to GET handlers, so the method is checked here.
async fn health(method: Method) -> Response {
    if method != Method::GET {
        return not_found().await.into_response();
    }
    Json(HealthResponse { ok: true }).into_response()
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}
