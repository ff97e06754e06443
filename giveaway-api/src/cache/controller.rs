//! Cache controller: refresh cycles and the stale-fallback policy.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use chrono::Utc;
use giveaway_core::{
    aggregate, CacheSnapshot, CacheStatus, GiveawayResult, MetricSource, PersistedSnapshot,
    ProductSeries,
};
use giveaway_storage::SnapshotStore;
use tokio::task::JoinHandle;

use crate::telemetry::METRICS;

/// Result of the fetch-and-aggregate half of a refresh cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// The source answered and the rows aggregated cleanly.
    Fresh(ProductSeries),

    /// The source or the aggregator failed. `fallback` is the durable
    /// snapshot, if one could be loaded.
    SourceFailed {
        error: String,
        fallback: Option<PersistedSnapshot>,
    },
}

/// Owns the in-memory cache and runs refresh cycles.
///
/// The snapshot lives behind a `RwLock<Arc<_>>`. The write lock is held only
/// to swap the pointer and the read lock only to clone it, so readers never
/// wait on a refresh in progress.
pub struct CacheController {
    source: Arc<dyn MetricSource>,
    store: Arc<dyn SnapshotStore>,
    current: RwLock<Arc<CacheSnapshot>>,
}

impl std::fmt::Debug for CacheController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheController")
            .field("source", &self.source.name())
            .field("store", &self.store.describe())
            .field("status", &self.current_snapshot().status)
            .finish()
    }
}

impl CacheController {
    /// Create a controller in the `Initializing` state.
    pub fn new(source: Arc<dyn MetricSource>, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            source,
            store,
            current: RwLock::new(Arc::new(CacheSnapshot::initializing())),
        }
    }

    /// The snapshot readers should see right now.
    pub fn current_snapshot(&self) -> Arc<CacheSnapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    fn swap(&self, snapshot: Arc<CacheSnapshot>) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = snapshot;
    }

    /// Run one refresh cycle and return the snapshot it installed.
    ///
    /// Never fails: every error ends up on the installed snapshot.
    pub async fn refresh(&self) -> Arc<CacheSnapshot> {
        let start = Instant::now();
        tracing::info!(source = self.source.name(), "Cache refresh started");

        let outcome = self.fetch().await;
        let snapshot = Arc::new(self.apply(outcome).await);
        self.swap(Arc::clone(&snapshot));

        let elapsed = start.elapsed();
        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_refresh(
                snapshot.status.as_str(),
                snapshot.product_count,
                elapsed.as_secs_f64(),
            );
        }

        match snapshot.status {
            CacheStatus::Ok => tracing::info!(
                products = snapshot.product_count,
                duration_ms = elapsed.as_millis(),
                "Cache refreshed"
            ),
            CacheStatus::Stale => tracing::warn!(
                products = snapshot.product_count,
                refreshed_at = ?snapshot.refreshed_at,
                error = snapshot.error.as_deref().unwrap_or_default(),
                "Cache refresh failed, serving durable snapshot"
            ),
            _ => tracing::error!(
                error = snapshot.error.as_deref().unwrap_or_default(),
                "Cache refresh failed with no durable snapshot"
            ),
        }

        snapshot
    }

    /// Start an extra refresh on the runtime and return without waiting.
    ///
    /// Not serialized against the scheduled loop: whichever cycle swaps last
    /// wins.
    pub fn force_refresh(self: &Arc<Self>) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            controller.refresh().await;
        })
    }

    async fn query(&self) -> GiveawayResult<ProductSeries> {
        let rows = self.source.fetch_samples().await?;
        Ok(aggregate(&rows)?)
    }

    /// Query the source and aggregate, loading the fallback on failure.
    async fn fetch(&self) -> RefreshOutcome {
        match self.query().await {
            Ok(series) => RefreshOutcome::Fresh(series),
            Err(e) => RefreshOutcome::SourceFailed {
                error: e.to_string(),
                fallback: self.load_fallback().await,
            },
        }
    }

    async fn load_fallback(&self) -> Option<PersistedSnapshot> {
        match self.store.load().await {
            Ok(found) => found,
            Err(e) => {
                tracing::error!(
                    store = %self.store.describe(),
                    error = %e,
                    "Durable snapshot unreadable, ignoring it"
                );
                None
            }
        }
    }

    /// Turn an outcome into the snapshot to install.
    ///
    /// For a fresh series the durable save is attempted first. A failed save
    /// is logged and the fresh snapshot is installed anyway.
    pub async fn apply(&self, outcome: RefreshOutcome) -> CacheSnapshot {
        match outcome {
            RefreshOutcome::Fresh(series) => {
                let refreshed_at = Utc::now();
                if let Err(e) = self.store.save(&series, refreshed_at, series.len()).await {
                    tracing::error!(
                        store = %self.store.describe(),
                        error = %e,
                        "Failed to persist snapshot"
                    );
                    if let Ok(metrics) = METRICS.as_ref() {
                        metrics.record_persist_failure();
                    }
                }
                CacheSnapshot::fresh(series, refreshed_at)
            }
            RefreshOutcome::SourceFailed {
                error,
                fallback: Some(persisted),
            } => CacheSnapshot::stale(persisted, error),
            RefreshOutcome::SourceFailed {
                error,
                fallback: None,
            } => CacheSnapshot::failed(error),
        }
    }
}
