//! Metrics Service
//!
//! Wait-free view of the cache for request handlers.

use std::sync::Arc;

use giveaway_core::{CacheSnapshot, CacheStatus, Timestamp};
use tokio::task::JoinHandle;

use crate::cache::CacheController;

/// Cache state as reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthView {
    pub status: CacheStatus,
    pub refreshed_at: Option<Timestamp>,
}

/// Handler-facing wrapper around the cache controller.
#[derive(Debug, Clone)]
pub struct MetricsService {
    controller: Arc<CacheController>,
}

impl MetricsService {
    pub fn new(controller: Arc<CacheController>) -> Self {
        Self { controller }
    }

    /// The snapshot to serve. Never waits on a refresh in progress.
    pub fn get_metrics(&self) -> Arc<CacheSnapshot> {
        self.controller.current_snapshot()
    }

    pub fn get_health(&self) -> HealthView {
        let snapshot = self.controller.current_snapshot();
        HealthView {
            status: snapshot.status,
            refreshed_at: snapshot.refreshed_at,
        }
    }

    /// Start an out-of-band refresh. The handle is only useful to tests.
    pub fn trigger_refresh(&self) -> JoinHandle<()> {
        self.controller.force_refresh()
    }
}
