//! Warehouse Data Source
//!
//! The cache controller depends only on [`MetricSource`]. The production
//! implementation is [`SnowflakeSource`], which runs [`overweight_query`]
//! through the Snowflake SQL API.

pub mod query;
pub mod snowflake;

pub use giveaway_core::MetricSource;
pub use query::overweight_query;
pub use snowflake::SnowflakeSource;
