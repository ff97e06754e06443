//! Background Jobs for GIVEAWAY API
//!
//! - `refresh`: drives the scheduled cache refresh cycle
//!
//! # Usage
//!
//! ```ignore
//! use giveaway_api::jobs::refresh_task;
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let job = tokio::spawn(refresh_task(Arc::clone(&controller), interval, shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! let summary = job.await?;
//! ```

pub mod refresh;

pub use refresh::{refresh_task, RefreshJobSummary};
