//! OpenAPI Specification for GIVEAWAY API
//!
//! Generated with utoipa from the route annotations and response types.

use utoipa::OpenApi;

use crate::error::{ApiError, ErrorCode};
use crate::routes::health::HealthResponse;
use crate::routes::overweights::OverweightsResponse;
use crate::routes::{health, overweights, refresh, StatusMessage};
use crate::telemetry::metrics;

use giveaway_core::{CacheStatus, WeeklyPoint};

/// OpenAPI document for GIVEAWAY API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "GIVEAWAY API",
        version = "0.1.0",
        description = "Weekly product-weight giveaway metrics, served from a warehouse-backed cache",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:5000", description = "Local Development")
    ),
    tags(
        (name = "Metrics", description = "Cached overweight series and manual refresh"),
        (name = "Health", description = "Liveness and cache state"),
        (name = "Observability", description = "Prometheus metrics")
    ),
    paths(
        overweights::get_overweights,
        refresh::trigger_refresh,
        health::health,
        metrics::metrics_handler,
    ),
    components(
        schemas(
            ApiError, ErrorCode,
            OverweightsResponse, StatusMessage, HealthResponse,
            CacheStatus, WeeklyPoint,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_document_has_schemas() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.schemas.contains_key("OverweightsResponse"));
        assert!(components.schemas.contains_key("WeeklyPoint"));
        assert_eq!(doc.paths.paths.len(), 4);
    }

    #[test]
    fn test_refreshed_at_documented_as_date_time() {
        let doc = serde_json::to_value(ApiDoc::openapi()).expect("serialize openapi");
        let schemas = &doc["components"]["schemas"];

        for schema in ["OverweightsResponse", "HealthResponse"] {
            let field = &schemas[schema]["properties"]["refreshed_at"];
            assert_eq!(field["format"], "date-time", "{schema}.refreshed_at");
        }
    }
}
