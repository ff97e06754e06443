//! API Configuration Module
//!
//! Configuration for the cache refresh cycle, CORS, and the warehouse
//! connection. Everything is loaded from environment variables with defaults
//! suitable for development.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::constants::{
    DEFAULT_ACCOUNT, DEFAULT_CHARACTERISTIC_PATTERN, DEFAULT_CORS_MAX_AGE_SECS,
    DEFAULT_LOOKBACK_WEEKS, DEFAULT_REFRESH_INTERVAL_SECS, DEFAULT_SNAPSHOT_PATH,
    DEFAULT_STATEMENT_TIMEOUT_SECS, DEFAULT_TOKEN_TYPE,
};

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// ============================================================================
// SERVICE CONFIGURATION
// ============================================================================

/// Cache refresh configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Time between scheduled refreshes (default: 6 hours)
    pub refresh_interval: Duration,

    /// Location of the durable snapshot file
    pub snapshot_path: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
        }
    }
}

impl ServiceConfig {
    /// Create ServiceConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `GIVEAWAY_REFRESH_INTERVAL_SECS`: Seconds between refreshes (default: 21600)
    /// - `GIVEAWAY_SNAPSHOT_PATH`: Durable snapshot file (default: /tmp/overweight_cache.json)
    pub fn from_env() -> Self {
        let refresh_interval = Duration::from_secs(
            env_parse::<u64>("GIVEAWAY_REFRESH_INTERVAL_SECS")
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS),
        );

        let snapshot_path = env_nonempty("GIVEAWAY_SNAPSHOT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_PATH));

        Self {
            refresh_interval,
            snapshot_path,
        }
    }
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// HTTP surface configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Allowed CORS origins. Empty means allow all origins.
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `GIVEAWAY_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `GIVEAWAY_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    pub fn from_env() -> Self {
        let cors_origins = std::env::var("GIVEAWAY_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_max_age_secs =
            env_parse("GIVEAWAY_CORS_MAX_AGE_SECS").unwrap_or(DEFAULT_CORS_MAX_AGE_SECS);

        Self {
            cors_origins,
            cors_max_age_secs,
        }
    }

    /// Whether any origin may call the API.
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.is_empty()
    }
}

// ============================================================================
// WAREHOUSE CONFIGURATION
// ============================================================================

/// Connection and query settings for the Snowflake SQL API.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Account identifier, e.g. `myorg-myaccount`
    pub account: String,

    /// Override for the SQL API base URL (defaults to the account host)
    pub base_url: Option<String>,

    /// Bearer token for the SQL API. Without one every refresh fails and
    /// the cache serves the durable snapshot.
    pub token: Option<SecretString>,

    /// Value of the `X-Snowflake-Authorization-Token-Type` header
    pub token_type: String,

    pub database: String,
    pub schema: String,
    pub warehouse: String,
    pub role: Option<String>,

    /// Server-side statement timeout; the HTTP client allows a little more
    pub statement_timeout: Duration,

    /// Weeks of history the query aggregates
    pub lookback_weeks: u32,

    /// ILIKE pattern selecting weight characteristics
    pub characteristic_pattern: String,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            account: DEFAULT_ACCOUNT.to_string(),
            base_url: None,
            token: None,
            token_type: DEFAULT_TOKEN_TYPE.to_string(),
            database: "ZMDNZIEQEO_DB".to_string(),
            schema: "tillamook-country-smoker-org".to_string(),
            warehouse: "PROD_DIRECT_ACCESS_WAREHOUSE".to_string(),
            role: None,
            statement_timeout: Duration::from_secs(DEFAULT_STATEMENT_TIMEOUT_SECS),
            lookback_weeks: DEFAULT_LOOKBACK_WEEKS,
            characteristic_pattern: DEFAULT_CHARACTERISTIC_PATTERN.to_string(),
        }
    }
}

impl WarehouseConfig {
    /// Create WarehouseConfig from environment variables.
    ///
    /// Environment variables:
    /// - `SF_ACCOUNT`, `SF_BASE_URL`, `SF_TOKEN`, `SF_TOKEN_TYPE`
    /// - `SF_DATABASE`, `SF_SCHEMA`, `SF_WAREHOUSE`, `SF_ROLE`
    /// - `SF_STATEMENT_TIMEOUT_SECS` (default: 120)
    /// - `SF_LOOKBACK_WEEKS` (default: 26)
    /// - `SF_CHARACTERISTIC_PATTERN` (default: `%Product Weight%`)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            account: env_nonempty("SF_ACCOUNT").unwrap_or(defaults.account),
            base_url: env_nonempty("SF_BASE_URL"),
            token: env_nonempty("SF_TOKEN").map(|t| SecretString::new(t.into())),
            token_type: env_nonempty("SF_TOKEN_TYPE").unwrap_or(defaults.token_type),
            database: env_nonempty("SF_DATABASE").unwrap_or(defaults.database),
            schema: env_nonempty("SF_SCHEMA").unwrap_or(defaults.schema),
            warehouse: env_nonempty("SF_WAREHOUSE").unwrap_or(defaults.warehouse),
            role: env_nonempty("SF_ROLE"),
            statement_timeout: env_parse::<u64>("SF_STATEMENT_TIMEOUT_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.statement_timeout),
            lookback_weeks: env_parse::<u32>("SF_LOOKBACK_WEEKS")
                .filter(|weeks| *weeks > 0)
                .unwrap_or(defaults.lookback_weeks),
            characteristic_pattern: env_nonempty("SF_CHARACTERISTIC_PATTERN")
                .unwrap_or(defaults.characteristic_pattern),
        }
    }

    /// Base URL of the SQL API, without a trailing slash.
    pub fn api_base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.snowflakecomputing.com", self.account),
        }
    }
}
