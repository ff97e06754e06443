//! Snowflake SQL API Source
//!
//! Runs the overweight query through the Snowflake SQL API v2:
//!
//! - `POST /api/v2/statements` submits the statement
//! - a `202` response means the statement is still running; its handle is
//!   polled with `GET /api/v2/statements/{handle}` until it completes
//! - results larger than one partition are fetched with `?partition=N`
//!
//! Values arrive as JSON strings (or null) and are decoded into
//! [`MetricSample`] rows here, so the aggregator only ever sees typed data.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use giveaway_core::{MetricSample, SourceError};
use reqwest::{header, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::query::overweight_query;
use super::MetricSource;
use crate::config::WarehouseConfig;
use crate::constants::{HTTP_TIMEOUT_GRACE_SECS, STATEMENT_POLL_INTERVAL_MS};

const STATEMENTS_PATH: &str = "/api/v2/statements";
const TOKEN_TYPE_HEADER: &str = "X-Snowflake-Authorization-Token-Type";
const EXPECTED_COLUMNS: usize = 6;

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    timeout: u64,
    database: &'a str,
    schema: &'a str,
    warehouse: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    statement_handle: Option<String>,
    #[serde(default)]
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Option<Vec<Vec<Option<String>>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    /// One entry per result partition; only the count matters here.
    #[serde(default)]
    partition_info: Vec<serde_json::Value>,
}

// ============================================================================
// SOURCE
// ============================================================================

/// Metric source backed by the Snowflake SQL API.
pub struct SnowflakeSource {
    client: reqwest::Client,
    base_url: String,
    token: Option<SecretString>,
    token_type: String,
    config: WarehouseConfig,
    statement: String,
    poll_interval: Duration,
}

impl std::fmt::Debug for SnowflakeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnowflakeSource")
            .field("base_url", &self.base_url)
            .field("database", &self.config.database)
            .field("schema", &self.config.schema)
            .field("warehouse", &self.config.warehouse)
            .field("has_token", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl SnowflakeSource {
    /// Build a source from configuration.
    ///
    /// A missing token is not fatal: the source is built and every fetch
    /// fails with `SourceError::NotConfigured`, so the cache keeps serving
    /// the durable snapshot.
    ///
    /// # Errors
    /// Returns `SourceError::Transport` if the HTTP client cannot be built.
    pub fn new(config: WarehouseConfig) -> Result<Self, SourceError> {
        let base_url = config.api_base_url();
        let token = config.token.clone();
        if token.is_none() {
            tracing::warn!(
                %base_url,
                "SF_TOKEN is not set; refreshes will fail until it is configured"
            );
        }

        let client = reqwest::Client::builder()
            .timeout(config.statement_timeout + Duration::from_secs(HTTP_TIMEOUT_GRACE_SECS))
            .user_agent(concat!("giveaway-api/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Transport {
                reason: format!("Failed to create HTTP client: {}", e),
            })?;

        let statement = overweight_query(&config);

        Ok(Self {
            client,
            base_url,
            token,
            token_type: config.token_type.clone(),
            config,
            statement,
            poll_interval: Duration::from_millis(STATEMENT_POLL_INTERVAL_MS),
        })
    }

    /// Override how often a running statement is polled.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = match &self.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        };
        builder
            .header(TOKEN_TYPE_HEADER, &self.token_type)
            .header(header::ACCEPT, "application/json")
    }

    async fn submit(&self) -> Result<(StatusCode, StatementResponse), SourceError> {
        let body = StatementRequest {
            statement: &self.statement,
            timeout: self.config.statement_timeout.as_secs(),
            database: &self.config.database,
            schema: &self.config.schema,
            warehouse: &self.config.warehouse,
            role: self.config.role.as_deref(),
        };

        let url = format!("{}{}", self.base_url, STATEMENTS_PATH);
        let response = self
            .authorized(self.client.post(url))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        read_response(response).await
    }

    async fn get_statement(
        &self,
        handle: &str,
        partition: Option<usize>,
    ) -> Result<(StatusCode, StatementResponse), SourceError> {
        let url = format!("{}{}/{}", self.base_url, STATEMENTS_PATH, handle);
        let mut request = self.authorized(self.client.get(url));
        if let Some(partition) = partition {
            request = request.query(&[("partition", partition)]);
        }

        let response = request.send().await.map_err(transport_error)?;
        read_response(response).await
    }

    /// Submit the statement and wait for its first result partition.
    async fn execute(&self) -> Result<StatementResponse, SourceError> {
        let (mut status, mut response) = self.submit().await?;

        while status == StatusCode::ACCEPTED {
            let handle = response
                .statement_handle
                .clone()
                .ok_or_else(|| SourceError::Statement {
                    code: response.code.clone().unwrap_or_default(),
                    message: "Statement accepted without a handle".to_string(),
                })?;
            tracing::debug!(%handle, "Statement still running, polling");
            tokio::time::sleep(self.poll_interval).await;
            (status, response) = self.get_statement(&handle, None).await?;
        }

        Ok(response)
    }

    async fn run(&self) -> Result<Vec<MetricSample>, SourceError> {
        let first = self.execute().await?;

        let partitions = first
            .result_set_meta_data
            .as_ref()
            .map(|meta| meta.partition_info.len())
            .unwrap_or(1);
        let handle = first.statement_handle.clone();

        let mut raw_rows = first.data.unwrap_or_default();
        if partitions > 1 {
            let handle = handle.ok_or_else(|| SourceError::Statement {
                code: first.code.clone().unwrap_or_default(),
                message: "Partitioned result without a statement handle".to_string(),
            })?;
            for partition in 1..partitions {
                let (_, page) = self.get_statement(&handle, Some(partition)).await?;
                raw_rows.extend(page.data.unwrap_or_default());
            }
        }

        tracing::debug!(rows = raw_rows.len(), partitions, "Warehouse query returned");
        decode_rows(raw_rows)
    }
}

#[async_trait]
impl MetricSource for SnowflakeSource {
    async fn fetch_samples(&self) -> Result<Vec<MetricSample>, SourceError> {
        if self.token.is_none() {
            return Err(SourceError::NotConfigured {
                field: "SF_TOKEN".to_string(),
            });
        }

        let deadline = self.config.statement_timeout + Duration::from_secs(HTTP_TIMEOUT_GRACE_SECS);
        match tokio::time::timeout(deadline, self.run()).await {
            Ok(Err(SourceError::Timeout { .. })) | Err(_) => Err(SourceError::Timeout {
                seconds: deadline.as_secs(),
            }),
            Ok(result) => result,
        }
    }

    fn name(&self) -> &str {
        "snowflake"
    }
}

// ============================================================================
// RESPONSE HANDLING
// ============================================================================

/// Timeout errors carry no duration here; `fetch_samples` fills it in.
fn transport_error(err: reqwest::Error) -> SourceError {
    if err.is_timeout() {
        SourceError::Timeout { seconds: 0 }
    } else {
        SourceError::Transport {
            reason: err.to_string(),
        }
    }
}

/// Read a SQL API response, mapping failures to [`SourceError`].
///
/// `200` and `202` carry a statement body. `422` is a failed statement with
/// a warehouse error code. Anything else is an HTTP error.
async fn read_response(
    response: reqwest::Response,
) -> Result<(StatusCode, StatementResponse), SourceError> {
    let status = response.status();
    let text = response.text().await.map_err(transport_error)?;
    classify_response(status, &text)
}

fn classify_response(
    status: StatusCode,
    text: &str,
) -> Result<(StatusCode, StatementResponse), SourceError> {
    match status {
        StatusCode::OK | StatusCode::ACCEPTED => {
            let body: StatementResponse =
                serde_json::from_str(text).map_err(|e| SourceError::Decode {
                    row: 0,
                    reason: format!("Invalid statement response: {}", e),
                })?;
            Ok((status, body))
        }
        StatusCode::UNPROCESSABLE_ENTITY => {
            let body: StatementResponse = serde_json::from_str(text).unwrap_or_default();
            Err(SourceError::Statement {
                code: body.code.unwrap_or_default(),
                message: body.message.unwrap_or_else(|| text.to_string()),
            })
        }
        StatusCode::REQUEST_TIMEOUT => Err(SourceError::Timeout { seconds: 0 }),
        other => {
            let message = serde_json::from_str::<StatementResponse>(text)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| truncate(text, 200));
            Err(SourceError::Http {
                status: other.as_u16(),
                message,
            })
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

// ============================================================================
// ROW DECODING
// ============================================================================

fn parse_f64(row: usize, column: &str, value: Option<&str>) -> Result<Option<f64>, SourceError> {
    value
        .map(|v| {
            v.trim().parse::<f64>().map_err(|e| SourceError::Decode {
                row,
                reason: format!("{} '{}': {}", column, v, e),
            })
        })
        .transpose()
}

/// Decode one SQL API row into a [`MetricSample`].
fn decode_row(row: usize, values: &[Option<String>]) -> Result<MetricSample, SourceError> {
    if values.len() < EXPECTED_COLUMNS {
        return Err(SourceError::Decode {
            row,
            reason: format!("expected {} columns, got {}", EXPECTED_COLUMNS, values.len()),
        });
    }

    let week_raw = values[0].as_deref().ok_or_else(|| SourceError::Decode {
        row,
        reason: "week_start is null".to_string(),
    })?;
    let week_start = NaiveDate::parse_from_str(week_raw.trim(), "%Y-%m-%d").map_err(|e| {
        SourceError::Decode {
            row,
            reason: format!("week_start '{}': {}", week_raw, e),
        }
    })?;

    let sample_count = match values[5].as_deref() {
        Some(v) => v.trim().parse::<i64>().map_err(|e| SourceError::Decode {
            row,
            reason: format!("sample_count '{}': {}", v, e),
        })?,
        None => 0,
    };

    Ok(MetricSample {
        week_start,
        product_key: values[1].clone(),
        avg_overweight: parse_f64(row, "avg_overweight", values[2].as_deref())?,
        avg_value: parse_f64(row, "avg_value", values[3].as_deref())?,
        avg_target: parse_f64(row, "avg_target", values[4].as_deref())?,
        sample_count,
    })
}

fn decode_rows(rows: Vec<Vec<Option<String>>>) -> Result<Vec<MetricSample>, SourceError> {
    rows.iter()
        .enumerate()
        .map(|(i, values)| decode_row(i, values))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, Query, State},
        http::HeaderMap,
        routing::{get, post},
        Json, Router,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn s(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[test]
    fn test_decode_row() {
        let row = vec![s("2024-01-01"), s("Bacon (B-1) "), s("1.20"), s("50.2"), s("49"), s("10")];
        let sample = decode_row(0, &row).unwrap();
        assert_eq!(sample.week_start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(sample.product_key.as_deref(), Some("Bacon (B-1) "));
        assert_eq!(sample.avg_overweight, Some(1.2));
        assert_eq!(sample.avg_target, Some(49.0));
        assert_eq!(sample.sample_count, 10);
    }

    #[test]
    fn test_decode_row_keeps_nulls() {
        let row = vec![s("2024-01-01"), None, None, s("50.2"), None, s("3")];
        let sample = decode_row(4, &row).unwrap();
        assert!(sample.product_key.is_none());
        assert!(sample.avg_overweight.is_none());
        assert!(sample.avg_target.is_none());
    }

    #[test]
    fn test_decode_row_rejects_bad_number() {
        let row = vec![s("2024-01-01"), s("Bacon"), s("abc"), s("1"), s("1"), s("1")];
        match decode_row(7, &row) {
            Err(SourceError::Decode { row, reason }) => {
                assert_eq!(row, 7);
                assert!(reason.contains("avg_overweight"));
            }
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_row_rejects_short_row() {
        assert!(matches!(
            decode_row(0, &[s("2024-01-01")]),
            Err(SourceError::Decode { .. })
        ));
    }

    #[test]
    fn test_classify_statement_failure() {
        let body = r#"{"code":"002003","message":"Object does not exist","sqlState":"02000"}"#;
        match classify_response(StatusCode::UNPROCESSABLE_ENTITY, body) {
            Err(SourceError::Statement { code, message }) => {
                assert_eq!(code, "002003");
                assert_eq!(message, "Object does not exist");
            }
            other => panic!("expected statement error, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_auth_failure() {
        match classify_response(StatusCode::UNAUTHORIZED, "not json") {
            Err(SourceError::Http { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "not json");
            }
            other => panic!("expected http error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_token_fails_each_fetch() {
        let source = SnowflakeSource::new(WarehouseConfig::default()).unwrap();

        for _ in 0..2 {
            assert_eq!(
                source.fetch_samples().await,
                Err(SourceError::NotConfigured {
                    field: "SF_TOKEN".to_string()
                })
            );
        }
    }

    proptest::proptest! {
        #[test]
        fn prop_decode_row_never_panics(
            values in proptest::collection::vec(proptest::option::of(".{0,12}"), 0..8)
        ) {
            match decode_row(3, &values) {
                Ok(sample) => proptest::prop_assert_eq!(sample.product_key, values[1].clone()),
                Err(SourceError::Decode { row, .. }) => proptest::prop_assert_eq!(row, 3),
                Err(other) => proptest::prop_assert!(false, "unexpected error {:?}", other),
            }
        }
    }

    // ------------------------------------------------------------------------
    // Stub SQL API
    // ------------------------------------------------------------------------

    #[derive(Default)]
    struct StubState {
        polls: AtomicUsize,
        pending_polls: usize,
    }

    async fn stub_submit(
        State(state): State<Arc<StubState>>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> (StatusCode, Json<serde_json::Value>) {
        assert_eq!(
            headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()),
            Some("Bearer test-token")
        );
        assert!(body["statement"].as_str().unwrap_or_default().contains("v_spcsample"));
        if state.pending_polls > 0 {
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({
                    "code": "333334",
                    "message": "Asynchronous execution in progress.",
                    "statementHandle": "h-1",
                })),
            )
        } else {
            (StatusCode::OK, Json(first_partition()))
        }
    }

    async fn stub_get(
        State(state): State<Arc<StubState>>,
        Path(handle): Path<String>,
        Query(params): Query<HashMap<String, String>>,
    ) -> (StatusCode, Json<serde_json::Value>) {
        assert_eq!(handle, "h-1");
        if let Some(partition) = params.get("partition") {
            assert_eq!(partition, "1");
            return (
                StatusCode::OK,
                Json(serde_json::json!({
                    "data": [["2024-01-01", "Jerky (J-2)", "0.40", "10.4", "10.00", "4"]],
                })),
            );
        }
        let polls = state.polls.fetch_add(1, Ordering::SeqCst) + 1;
        if polls < state.pending_polls {
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({ "code": "333334", "statementHandle": "h-1" })),
            )
        } else {
            (StatusCode::OK, Json(first_partition()))
        }
    }

    fn first_partition() -> serde_json::Value {
        serde_json::json!({
            "code": "090001",
            "statementHandle": "h-1",
            "resultSetMetaData": {
                "numRows": 3,
                "partitionInfo": [{ "rowCount": 2 }, { "rowCount": 1 }],
            },
            "data": [
                ["2024-01-01", "Bacon (B-1) ", "1.20", "50.20", "49.00", "10"],
                ["2024-01-08", "Bacon (B-1)", null, "49.80", "49.00", "8"],
            ],
        })
    }

    async fn spawn_stub(pending_polls: usize) -> String {
        let state = Arc::new(StubState {
            polls: AtomicUsize::new(0),
            pending_polls,
        });
        let app = Router::new()
            .route("/api/v2/statements", post(stub_submit))
            .route("/api/v2/statements/:handle", get(stub_get))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}", addr)
    }

    fn stub_config(base_url: String) -> WarehouseConfig {
        WarehouseConfig {
            base_url: Some(base_url),
            token: Some(SecretString::new("test-token".into())),
            statement_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_samples_reads_all_partitions() {
        let base_url = spawn_stub(0).await;
        let source = SnowflakeSource::new(stub_config(base_url)).unwrap();

        let rows = source.fetch_samples().await.unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].sample_count, 10);
        assert!(rows[1].avg_overweight.is_none());
        assert_eq!(rows[2].product_key.as_deref(), Some("Jerky (J-2)"));
    }

    #[tokio::test]
    async fn test_fetch_samples_polls_running_statement() {
        let base_url = spawn_stub(3).await;
        let source = SnowflakeSource::new(stub_config(base_url))
            .unwrap()
            .with_poll_interval(Duration::from_millis(5));

        let rows = source.fetch_samples().await.unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[tokio::test]
    async fn test_unreachable_warehouse_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source = SnowflakeSource::new(stub_config(format!("http://{}", addr))).unwrap();
        assert!(matches!(
            source.fetch_samples().await,
            Err(SourceError::Transport { .. })
        ));
    }
}
