//! Health Check Endpoint
//!
//! `/health` reports process liveness plus the cache state. It answers `200`
//! whatever the cache holds; the `cache` field says whether data is usable.

use axum::{extract::State, Json};
use giveaway_core::{CacheStatus, Timestamp};
use serde::{Deserialize, Serialize};

use super::AppState;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthResponse {
    pub status: String,
    pub cache: CacheStatus,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub refreshed_at: Option<Timestamp>,
}

/// GET /health - Liveness and cache state
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is responding", body = HealthResponse),
    ),
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let view = state.metrics.get_health();
    Json(HealthResponse {
        status: "ok".to_string(),
        cache: view.status,
        refreshed_at: view.refreshed_at,
    })
}
