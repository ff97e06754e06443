//! Manual Refresh Endpoint

use axum::{extract::State, Json};

use super::{AppState, StatusMessage};

const REFRESH_STARTED_MESSAGE: &str = "Refresh started, check back in ~60 seconds.";

/// POST /api/refresh - Start an out-of-band cache refresh
///
/// Returns as soon as the refresh is spawned.
#[utoipa::path(
    post,
    path = "/api/refresh",
    tag = "Metrics",
    responses(
        (status = 200, description = "Refresh started", body = StatusMessage),
    ),
)]
pub async fn trigger_refresh(State(state): State<AppState>) -> Json<StatusMessage> {
    // Detached; the outcome shows up on the next read.
    drop(state.metrics.trigger_refresh());
    tracing::info!("Manual cache refresh requested");
    Json(StatusMessage::new("ok", REFRESH_STARTED_MESSAGE))
}
