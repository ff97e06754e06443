//! Constants for GIVEAWAY API
//!
//! Defaults for every environment-driven setting live here so they are easy
//! to find and test.

// ============================================================================
// CACHE REFRESH
// ============================================================================

/// Default interval between scheduled refreshes in seconds (6 hours)
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 6 * 60 * 60;

/// Default location of the durable snapshot
pub const DEFAULT_SNAPSHOT_PATH: &str = "/tmp/overweight_cache.json";

/// Seconds clients are told to wait while the cache is initializing
pub const INITIALIZING_RETRY_AFTER_SECS: u64 = 60;

// ============================================================================
// WAREHOUSE
// ============================================================================

/// Default statement timeout for the warehouse query in seconds
pub const DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 120;

/// Extra time the HTTP client waits beyond the statement timeout
pub const HTTP_TIMEOUT_GRACE_SECS: u64 = 15;

/// How often a still-running statement is polled, in milliseconds
pub const STATEMENT_POLL_INTERVAL_MS: u64 = 1_000;

/// Default number of weeks of history to aggregate
pub const DEFAULT_LOOKBACK_WEEKS: u32 = 26;

/// Default characteristic-name pattern selecting weight checks
pub const DEFAULT_CHARACTERISTIC_PATTERN: &str = "%Product Weight%";

/// Default Snowflake account identifier
pub const DEFAULT_ACCOUNT: &str = "redzone-prod_direct_access_reader";

/// Default Snowflake token type header value
pub const DEFAULT_TOKEN_TYPE: &str = "PROGRAMMATIC_ACCESS_TOKEN";

// ============================================================================
// CORS
// ============================================================================

/// Default CORS max age in seconds (24 hours)
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;

// ============================================================================
// SERVER
// ============================================================================

/// Default bind host
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Default port
pub const DEFAULT_PORT: u16 = 5000;
