//! GIVEAWAY API - Cached Weight Metrics over HTTP
//!
//! Serves weekly product-weight giveaway metrics from an in-memory cache.
//! A background task refreshes the cache from the Snowflake SQL API every
//! few hours and persists each good result, so a failed refresh can fall
//! back to the last durable snapshot instead of an empty answer.

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod jobs;
pub mod openapi;
pub mod routes;
pub mod services;
pub mod telemetry;
pub mod warehouse;

// Re-export commonly used types
pub use cache::{CacheController, RefreshOutcome};
pub use config::{ApiConfig, ServiceConfig, WarehouseConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use openapi::ApiDoc;
pub use routes::{create_api_router, AppState, StatusMessage};
pub use services::{HealthView, MetricsService};
pub use warehouse::{overweight_query, MetricSource, SnowflakeSource};
