//! REST API Routes Module
//!
//! Includes:
//! - `GET /api/overweights`: cached per-product weight series
//! - `POST /api/refresh`: out-of-band cache refresh
//! - `GET /health`: liveness and cache state
//! - `GET /metrics`: Prometheus exposition
//! - `GET /openapi.json`: OpenAPI document
//! - CORS support for browser dashboards

pub mod health;
pub mod overweights;
pub mod refresh;

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method, Uri},
    middleware::from_fn,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::services::MetricsService;
use crate::telemetry::{metrics_handler, observability_middleware};

// ============================================================================
// SHARED TYPES
// ============================================================================

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub metrics: MetricsService,
}

impl AppState {
    pub fn new(metrics: MetricsService) -> Self {
        Self { metrics }
    }
}

/// `{status, message}` body used for non-data responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct StatusMessage {
    pub status: String,
    pub message: String,
}

impl StatusMessage {
    pub fn new(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// OPENAPI ENDPOINT
// ============================================================================

/// Handler for /openapi.json endpoint.
async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("No route for {}", uri.path()))
}

// ============================================================================
// ROUTER
// ============================================================================

fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::RETRY_AFTER])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.allows_any_origin() {
        tracing::info!("CORS: allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!("CORS: allowing origins: {:?}", config.cors_origins);
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

/// Create the complete API router.
///
/// Every route passes through the observability middleware and the CORS
/// layer. Unknown paths get a JSON `404`.
pub fn create_api_router(state: AppState, config: &ApiConfig) -> Router {
    Router::new()
        .route("/api/overweights", get(overweights::get_overweights))
        .route("/api/refresh", post(refresh::trigger_refresh))
        .route("/health", get(health::health))
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(openapi_json))
        .fallback(not_found)
        .with_state(state)
        .layer(from_fn(observability_middleware))
        .layer(build_cors_layer(config))
}
