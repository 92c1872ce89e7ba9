use axum::{extract::State, response::Response};
use serde::Serialize;
use utoipa::ToSchema;

use super::common::success_response;
use crate::AppState;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
}

/// Liveness plus a database ping.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service health", body = HealthResponse))
)]
pub async fn health_check(State(state): State<AppState>) -> Response {
    let database = if state.db.ping().await.is_ok() {
        "connected"
    } else {
        "unavailable"
    };
    success_response(HealthResponse {
        status: "ok".to_string(),
        database: database.to_string(),
    })
}
