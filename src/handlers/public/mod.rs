// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Kiosks poll these before they hold a token: liveness, server clock.
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::AppState;

/// GET / - Service identity
pub async fn root() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /health - Liveness plus a store round trip
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let backend = state.store.backend();

    match state.store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "backend": backend,
                "database": "ok"
            })),
        ),
        Err(e) => {
            tracing::error!(backend, "Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "backend": backend,
                    "database": "unavailable"
                })),
            )
        }
    }
}

/// GET /time - Server clock so kiosks can detect drift
pub async fn time() -> Json<Value> {
    Json(json!({ "time": chrono::Utc::now().to_rfc3339() }))
}

/// Fallback for unmatched routes
pub async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}
