//! Prometheus Metrics Definitions
//!
//! Defines all GIVEAWAY metrics with appropriate labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram, register_histogram_vec,
    register_int_counter, CounterVec, Encoder, Gauge, Histogram, HistogramVec, IntCounter,
    TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Refresh cycles are dominated by the warehouse query, so the buckets run
/// from a second up to several minutes.
const REFRESH_LATENCY_BUCKETS: &[f64] = &[0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<GiveawayMetrics>> = Lazy::new(GiveawayMetrics::new);

/// Container for all GIVEAWAY metrics.
#[derive(Clone)]
pub struct GiveawayMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Refresh cycle counter - labels: outcome (ok/stale/error)
    pub cache_refreshes_total: CounterVec,

    /// Refresh cycle duration
    pub cache_refresh_duration_seconds: Histogram,

    /// Products in the served snapshot
    pub cache_products: Gauge,

    /// Durable snapshot writes that failed
    pub snapshot_persist_failures_total: IntCounter,
}

fn registration_error(name: &str, err: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, err))
}

impl GiveawayMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "giveaway_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "giveaway_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("http_request_duration_seconds", e))?,

            cache_refreshes_total: register_counter_vec!(
                "giveaway_cache_refreshes_total",
                "Total number of cache refresh cycles by outcome",
                &["outcome"]
            )
            .map_err(|e| registration_error("cache_refreshes_total", e))?,

            cache_refresh_duration_seconds: register_histogram!(
                "giveaway_cache_refresh_duration_seconds",
                "Cache refresh cycle duration in seconds",
                REFRESH_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("cache_refresh_duration_seconds", e))?,

            cache_products: register_gauge!(
                "giveaway_cache_products",
                "Number of products in the served snapshot"
            )
            .map_err(|e| registration_error("cache_products", e))?,

            snapshot_persist_failures_total: register_int_counter!(
                "giveaway_snapshot_persist_failures_total",
                "Total number of failed durable snapshot writes"
            )
            .map_err(|e| registration_error("snapshot_persist_failures_total", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, status_str.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record a completed refresh cycle.
    pub fn record_refresh(&self, outcome: &str, products: usize, duration_secs: f64) {
        self.cache_refreshes_total
            .with_label_values(&[outcome])
            .inc();
        self.cache_refresh_duration_seconds.observe(duration_secs);
        self.cache_products.set(products as f64);
    }

    /// Record a failed durable snapshot write.
    pub fn record_persist_failure(&self) {
        self.snapshot_persist_failures_total.inc();
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
)]
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
