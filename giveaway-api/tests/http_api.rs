//! HTTP surface over a live controller, following one cache through its
//! lifecycle.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use giveaway_api::{create_api_router, ApiConfig, AppState, CacheController, MetricsService};
use giveaway_test_utils::{fixtures, MemorySnapshotStore, ScriptedSource};
use tower::ServiceExt;

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get(app: &Router, uri: &str) -> Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn overweights_through_initializing_ok_and_stale() {
    let source = ScriptedSource::new()
        .then_ok(fixtures::two_product_rows())
        .then_err(fixtures::warehouse_timeout());
    let controller = Arc::new(CacheController::new(
        Arc::new(source),
        Arc::new(MemorySnapshotStore::new()),
    ));
    let app = create_api_router(
        AppState::new(MetricsService::new(Arc::clone(&controller))),
        &ApiConfig::default(),
    );

    let response = get(&app, "/api/overweights").await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response.headers()[header::RETRY_AFTER], "60");

    let health = body_json(get(&app, "/health").await).await;
    assert_eq!(health["cache"], "initializing");
    assert!(health["refreshed_at"].is_null());

    controller.refresh().await;
    let response = get(&app, "/api/overweights").await;
    assert_eq!(response.status(), StatusCode::OK);
    let fresh = body_json(response).await;
    assert_eq!(fresh["cache_status"], "ok");
    assert_eq!(fresh["product_count"], 2);
    assert_eq!(fresh["data"]["Bacon (B-1)"].as_array().unwrap().len(), 2);
    assert_eq!(fresh["data"]["Jerky (J-2)"][0]["avg_target"], 10.0);

    controller.refresh().await;
    let response = get(&app, "/api/overweights").await;
    assert_eq!(response.status(), StatusCode::OK);
    let stale = body_json(response).await;
    assert_eq!(stale["cache_status"], "stale");
    assert_eq!(stale["data"], fresh["data"]);
    assert_eq!(stale["refreshed_at"], fresh["refreshed_at"]);
    assert!(stale["error"].as_str().unwrap().contains("timed out"));

    let health = body_json(get(&app, "/health").await).await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["cache"], "stale");
}

#[tokio::test]
async fn corrupt_store_and_failed_source_gives_500() {
    let controller = Arc::new(CacheController::new(
        Arc::new(ScriptedSource::always_err(fixtures::warehouse_timeout())),
        Arc::new(MemorySnapshotStore::corrupt()),
    ));
    let app = create_api_router(
        AppState::new(MetricsService::new(Arc::clone(&controller))),
        &ApiConfig::default(),
    );
    controller.refresh().await;

    let response = get(&app, "/api/overweights").await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["status"], "error");
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn manual_refresh_runs_in_background() {
    let source = Arc::new(ScriptedSource::always_ok(fixtures::bacon_rows()));
    let controller = Arc::new(CacheController::new(
        source.clone(),
        Arc::new(MemorySnapshotStore::new()),
    ));
    let app = create_api_router(
        AppState::new(MetricsService::new(Arc::clone(&controller))),
        &ApiConfig::default(),
    );

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/refresh")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    for _ in 0..200 {
        if source.call_count() > 0
            && controller.current_snapshot().status == giveaway_core::CacheStatus::Ok
        {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert_eq!(get(&app, "/api/overweights").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn metrics_endpoint_reports_refresh_counters() {
    let controller = Arc::new(CacheController::new(
        Arc::new(ScriptedSource::always_ok(fixtures::bacon_rows())),
        Arc::new(MemorySnapshotStore::new()),
    ));
    let app = create_api_router(
        AppState::new(MetricsService::new(Arc::clone(&controller))),
        &ApiConfig::default(),
    );
    controller.refresh().await;

    let response = get(&app, "/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("giveaway_cache_refreshes_total"));
    assert!(text.contains("outcome=\"ok\""));
}
