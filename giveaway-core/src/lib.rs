//! GIVEAWAY Core - Metric Types
//!
//! Data structures shared by every GIVEAWAY crate: raw warehouse rows, the
//! aggregated per-product series, the cache snapshot served to readers, and
//! the persisted form of the last good snapshot. The only behaviour here is
//! the pure [`aggregate`] function.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub mod aggregate;

pub use aggregate::aggregate;

// ============================================================================
// BASIC TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Aggregated weekly points keyed by trimmed product key.
///
/// Keys are kept in a `BTreeMap` so the serialized document is stable between
/// refreshes. Points within a product keep the order the source returned them.
pub type ProductSeries = BTreeMap<String, Vec<WeeklyPoint>>;

// ============================================================================
// RAW ROWS
// ============================================================================

/// One raw row as returned by the warehouse query.
///
/// The averages are nullable because the warehouse may return NULL for a
/// bucket; the aggregator coerces them to `0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub week_start: NaiveDate,
    /// Product display key, untrimmed. `None` only when the warehouse
    /// returned NULL for the column.
    pub product_key: Option<String>,
    pub avg_overweight: Option<f64>,
    pub avg_value: Option<f64>,
    pub avg_target: Option<f64>,
    pub sample_count: i64,
}

impl MetricSample {
    /// Build a fully-populated row.
    pub fn new(
        week_start: NaiveDate,
        product_key: impl Into<String>,
        avg_overweight: f64,
        avg_value: f64,
        avg_target: f64,
        sample_count: i64,
    ) -> Self {
        Self {
            week_start,
            product_key: Some(product_key.into()),
            avg_overweight: Some(avg_overweight),
            avg_value: Some(avg_value),
            avg_target: Some(avg_target),
            sample_count,
        }
    }
}

// ============================================================================
// AGGREGATED SERIES
// ============================================================================

/// One week of aggregated weight data for a single product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct WeeklyPoint {
    /// Monday of the week, rendered `YYYY-MM-DD`.
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Date))]
    pub week_start: NaiveDate,
    /// Average of `value - target`.
    pub avg_overweight: f64,
    pub avg_value: f64,
    pub avg_target: f64,
    /// Number of weight samples in the bucket.
    #[serde(rename = "count")]
    pub sample_count: i64,
}

// ============================================================================
// CACHE SNAPSHOT
// ============================================================================

/// Status of the in-memory cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// No refresh has completed since process start.
    Initializing,
    /// Data came from the most recent refresh.
    Ok,
    /// The most recent refresh failed; data is the durable fallback.
    Stale,
    /// The most recent refresh failed and no fallback was available.
    Error,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Initializing => "initializing",
            CacheStatus::Ok => "ok",
            CacheStatus::Stale => "stale",
            CacheStatus::Error => "error",
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable version of the cached dataset plus its status.
///
/// Snapshots are never edited after construction; the cache controller
/// replaces them wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub series: ProductSeries,
    pub refreshed_at: Option<Timestamp>,
    pub product_count: usize,
    pub status: CacheStatus,
    pub error: Option<String>,
}

impl CacheSnapshot {
    /// The snapshot every process starts with.
    pub fn initializing() -> Self {
        Self {
            series: ProductSeries::new(),
            refreshed_at: None,
            product_count: 0,
            status: CacheStatus::Initializing,
            error: None,
        }
    }

    /// A snapshot built from a successful refresh.
    pub fn fresh(series: ProductSeries, refreshed_at: Timestamp) -> Self {
        let product_count = series.len();
        Self {
            series,
            refreshed_at: Some(refreshed_at),
            product_count,
            status: CacheStatus::Ok,
            error: None,
        }
    }

    /// A snapshot served from the durable fallback after a failed refresh.
    pub fn stale(persisted: PersistedSnapshot, error: impl Into<String>) -> Self {
        Self {
            series: persisted.data,
            refreshed_at: Some(persisted.refreshed_at),
            product_count: persisted.product_count,
            status: CacheStatus::Stale,
            error: Some(error.into()),
        }
    }

    /// A snapshot recording a failed refresh with nothing to fall back to.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            series: ProductSeries::new(),
            refreshed_at: None,
            product_count: 0,
            status: CacheStatus::Error,
            error: Some(error.into()),
        }
    }

    /// True when the snapshot carries no product data at all.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl Default for CacheSnapshot {
    fn default() -> Self {
        Self::initializing()
    }
}

/// Durable form of the last successful snapshot.
///
/// The field names are the on-disk format: `{data, refreshed_at, product_count}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub data: ProductSeries,
    pub refreshed_at: Timestamp,
    pub product_count: usize,
}

impl PersistedSnapshot {
    pub fn new(data: ProductSeries, refreshed_at: Timestamp) -> Self {
        let product_count = data.len();
        Self {
            data,
            refreshed_at,
            product_count,
        }
    }
}

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Failures of the warehouse data source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("Warehouse request failed: {reason}")]
    Transport { reason: String },

    #[error("Warehouse returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Warehouse statement failed ({code}): {message}")]
    Statement { code: String, message: String },

    #[error("Warehouse query timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Failed to decode warehouse row {row}: {reason}")]
    Decode { row: usize, reason: String },

    #[error("Warehouse not configured: {field}")]
    NotConfigured { field: String },
}

/// Failures turning raw rows into a [`ProductSeries`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("Row {row} has no product key")]
    MissingProductKey { row: usize },
}

/// Failures of the durable snapshot store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("Snapshot I/O failed at {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Snapshot encoding failed: {reason}")]
    Encode { reason: String },

    #[error("Snapshot at {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },
}

/// Master error type for GIVEAWAY.
///
/// Messages pass through unchanged; they end up on the cache snapshot.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GiveawayError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Result type alias for GIVEAWAY operations.
pub type GiveawayResult<T> = Result<T, GiveawayError>;

// ============================================================================
// DATA SOURCE
// ============================================================================

/// Source of raw weekly weight rows.
///
/// Implementations carry their own timeouts. Any failure, timeout included,
/// is reported as a [`SourceError`] and the caller falls back to the durable
/// snapshot.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Run the metrics query and return every row, in source order.
    async fn fetch_samples(&self) -> Result<Vec<MetricSample>, SourceError>;

    /// Short name used in log lines.
    fn name(&self) -> &str;
}
