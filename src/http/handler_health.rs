//! Handles GET /health - Liveness check

use axum::{http::StatusCode, response::IntoResponse};

pub async fn handle_health() -> impl IntoResponse {
    tracing::debug!("Health check");
    (StatusCode::OK, "OK")
}
