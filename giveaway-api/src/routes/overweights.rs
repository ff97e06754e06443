//! Overweight Metrics Endpoint
//!
//! `GET /api/overweights` serves the cached per-product weekly series. The
//! handler only reads the current snapshot; it never waits on the warehouse.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use giveaway_core::{CacheSnapshot, CacheStatus, ProductSeries, Timestamp};
use serde::{Deserialize, Serialize};

use super::{AppState, StatusMessage};
use crate::constants::INITIALIZING_RETRY_AFTER_SECS;

const INITIALIZING_MESSAGE: &str =
    "Data is loading from the warehouse, please check back in 60 seconds.";

// ============================================================================
// TYPES
// ============================================================================

/// Cached metrics payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct OverweightsResponse {
    /// Always `"ok"`; see `cache_status` for freshness
    pub status: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub refreshed_at: Option<Timestamp>,
    pub product_count: usize,
    pub cache_status: CacheStatus,
    /// Weekly points keyed by product
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub data: ProductSeries,
    /// Why the last refresh failed, when serving stale data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&CacheSnapshot> for OverweightsResponse {
    fn from(snapshot: &CacheSnapshot) -> Self {
        Self {
            status: "ok".to_string(),
            refreshed_at: snapshot.refreshed_at,
            product_count: snapshot.product_count,
            cache_status: snapshot.status,
            data: snapshot.series.clone(),
            error: snapshot.error.clone(),
        }
    }
}

/// Map a snapshot to the HTTP response for it.
fn render(snapshot: &CacheSnapshot) -> Response {
    match snapshot.status {
        CacheStatus::Initializing => (
            StatusCode::ACCEPTED,
            [(
                header::RETRY_AFTER,
                INITIALIZING_RETRY_AFTER_SECS.to_string(),
            )],
            Json(StatusMessage::new("initializing", INITIALIZING_MESSAGE)),
        )
            .into_response(),
        CacheStatus::Error if snapshot.is_empty() => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(StatusMessage::new(
                "error",
                snapshot.error.as_deref().unwrap_or("Unknown error"),
            )),
        )
            .into_response(),
        _ => (StatusCode::OK, Json(OverweightsResponse::from(snapshot))).into_response(),
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/overweights - Cached overweight series
#[utoipa::path(
    get,
    path = "/api/overweights",
    tag = "Metrics",
    responses(
        (status = 200, description = "Cached series (fresh or stale)", body = OverweightsResponse),
        (status = 202, description = "First refresh still running", body = StatusMessage,
            headers(("Retry-After" = u64, description = "Seconds to wait before retrying"))),
        (status = 500, description = "Refresh failed and no durable snapshot exists", body = StatusMessage),
    ),
)]
pub async fn get_overweights(State(state): State<AppState>) -> Response {
    let snapshot = state.metrics.get_metrics();
    render(&snapshot)
}
