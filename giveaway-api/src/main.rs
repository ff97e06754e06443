//! GIVEAWAY API Server Entry Point
//!
//! Bootstraps configuration, starts the cache refresh task, and serves the
//! Axum HTTP API until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use giveaway_api::{
    create_api_router, jobs::refresh_task, ApiConfig, ApiError, ApiResult, AppState,
    CacheController, MetricsService, ServiceConfig, SnowflakeSource, WarehouseConfig,
};
use giveaway_storage::FileSnapshotStore;
use tokio::sync::watch;

use giveaway_api::constants::{DEFAULT_BIND_HOST, DEFAULT_PORT};
use giveaway_api::telemetry::{init_tracer, shutdown_tracer, TelemetryConfig};

#[tokio::main]
async fn main() -> ApiResult<()> {
    dotenvy::dotenv().ok();

    let telemetry_config = TelemetryConfig::default();
    init_tracer(&telemetry_config)?;

    let service_config = ServiceConfig::from_env();
    let api_config = ApiConfig::from_env();
    let warehouse_config = WarehouseConfig::from_env();

    let source = Arc::new(SnowflakeSource::new(warehouse_config)?);
    let store = Arc::new(FileSnapshotStore::new(service_config.snapshot_path.clone()));
    tracing::info!(
        snapshot_path = %service_config.snapshot_path.display(),
        refresh_interval_secs = service_config.refresh_interval.as_secs(),
        "Cache configured"
    );

    let controller = Arc::new(CacheController::new(source, store));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresh_job = tokio::spawn(refresh_task(
        Arc::clone(&controller),
        service_config.refresh_interval,
        shutdown_rx,
    ));

    let state = AppState::new(MetricsService::new(controller));
    let app: Router = create_api_router(state, &api_config);

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting GIVEAWAY API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = refresh_job.await {
        tracing::error!(error = %e, "Cache refresh task ended abnormally");
    }

    shutdown_tracer();
    Ok(())
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host =
        std::env::var("GIVEAWAY_API_BIND").unwrap_or_else(|_| DEFAULT_BIND_HOST.to_string());
    let port = match std::env::var("PORT") {
        Ok(port_str) => port_str.trim().parse::<u16>().map_err(|_| {
            ApiError::invalid_input(format!("Invalid port value: {}", port_str))
        })?,
        Err(_) => DEFAULT_PORT,
    };

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>().map_err(|e| {
        ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e))
    })
}
