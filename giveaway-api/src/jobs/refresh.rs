//! Scheduled Cache Refresh
//!
//! A single long-lived task refreshes the cache immediately at startup, then
//! sleeps for the configured interval (6 hours by default) and repeats. The
//! sleep starts after a cycle finishes, so a slow warehouse stretches the
//! period rather than stacking cycles.
//!
//! The task stops when the watch channel flips to `true` or its sender is
//! dropped. A cycle still in flight at that point is abandoned; the durable snapshot is only ever
//! replaced by rename, so an abandoned save leaves the previous file intact.

use std::sync::Arc;
use std::time::Duration;

use giveaway_core::CacheStatus;
use tokio::sync::watch;

use crate::cache::CacheController;

/// Cycle counts for the lifetime of one refresh task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshJobSummary {
    pub cycles: u64,
    pub ok: u64,
    pub stale: u64,
    pub error: u64,
}

impl RefreshJobSummary {
    fn record(&mut self, status: CacheStatus) {
        self.cycles += 1;
        match status {
            CacheStatus::Ok => self.ok += 1,
            CacheStatus::Stale => self.stale += 1,
            CacheStatus::Error | CacheStatus::Initializing => self.error += 1,
        }
    }
}

fn is_shutdown(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow()
}

/// Whether a `changed()` result asks the task to stop. A dropped sender
/// counts as shutdown.
fn stop_requested(
    changed: Result<(), watch::error::RecvError>,
    rx: &watch::Receiver<bool>,
) -> bool {
    changed.is_err() || is_shutdown(rx)
}

/// Background task that keeps the cache refreshed.
///
/// # Arguments
///
/// * `controller` - Cache controller shared with the HTTP handlers
/// * `interval` - Sleep between the end of one cycle and the start of the next
/// * `shutdown_rx` - Watch receiver for shutdown signal
///
/// # Returns
///
/// Counts of the cycles that completed before shutdown
pub async fn refresh_task(
    controller: Arc<CacheController>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> RefreshJobSummary {
    let mut summary = RefreshJobSummary::default();

    tracing::info!(
        interval_secs = interval.as_secs(),
        "Cache refresh task started"
    );

    'cycles: while !is_shutdown(&shutdown_rx) {
        let refresh = controller.refresh();
        tokio::pin!(refresh);

        loop {
            tokio::select! {
                snapshot = &mut refresh => {
                    summary.record(snapshot.status);
                    break;
                }
                changed = shutdown_rx.changed() => {
                    if stop_requested(changed, &shutdown_rx) {
                        tracing::info!("Cache refresh abandoned for shutdown");
                        break 'cycles;
                    }
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown_rx.changed() => {
                if stop_requested(changed, &shutdown_rx) {
                    break;
                }
            }
        }
    }

    tracing::info!(
        cycles = summary.cycles,
        ok = summary.ok,
        stale = summary.stale,
        error = summary.error,
        "Cache refresh task stopped"
    );

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use giveaway_storage::MemorySnapshotStore;
    use giveaway_test_utils::{fixtures, ScriptedSource};

    const SIX_HOURS: Duration = Duration::from_secs(6 * 60 * 60);

    fn controller(source: Arc<ScriptedSource>) -> Arc<CacheController> {
        Arc::new(CacheController::new(
            source,
            Arc::new(MemorySnapshotStore::new()),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshes_immediately_then_on_interval() {
        let source = Arc::new(ScriptedSource::always_ok(fixtures::bacon_rows()));
        let controller = controller(Arc::clone(&source));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let job = tokio::spawn(refresh_task(
            Arc::clone(&controller),
            SIX_HOURS,
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.call_count(), 1);
        assert_eq!(controller.current_snapshot().status, CacheStatus::Ok);

        tokio::time::sleep(SIX_HOURS * 2).await;
        assert_eq!(source.call_count(), 3);

        shutdown_tx.send(true).unwrap();
        let summary = job.await.unwrap();
        assert_eq!(summary.cycles, 3);
        assert_eq!(summary.ok, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycles_do_not_stop_the_loop() {
        let source = Arc::new(ScriptedSource::always_err(fixtures::warehouse_timeout()));
        let controller = controller(Arc::clone(&source));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let job = tokio::spawn(refresh_task(controller, SIX_HOURS, shutdown_rx));

        tokio::time::sleep(SIX_HOURS + Duration::from_secs(1)).await;
        shutdown_tx.send(true).unwrap();

        let summary = job.await.unwrap();
        assert_eq!(summary.cycles, 2);
        assert_eq!(summary.error, 2);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_slow_cycle() {
        let (source, _gate) = ScriptedSource::always_ok(Vec::new()).gated();
        let source = Arc::new(source);
        let started = source.started();
        let controller = controller(Arc::clone(&source));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let job = tokio::spawn(refresh_task(
            Arc::clone(&controller),
            SIX_HOURS,
            shutdown_rx,
        ));

        started.notified().await;
        shutdown_tx.send(true).unwrap();

        let summary = tokio::time::timeout(Duration::from_secs(5), job)
            .await
            .expect("refresh task did not stop")
            .unwrap();
        assert_eq!(summary.cycles, 0);
        assert_eq!(
            controller.current_snapshot().status,
            CacheStatus::Initializing
        );
    }

    #[tokio::test]
    async fn test_non_shutdown_change_keeps_cycle_running() {
        let (source, gate) = ScriptedSource::always_ok(fixtures::bacon_rows()).gated();
        let source = Arc::new(source);
        let started = source.started();
        let controller = controller(Arc::clone(&source));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let job = tokio::spawn(refresh_task(
            Arc::clone(&controller),
            SIX_HOURS,
            shutdown_rx,
        ));

        started.notified().await;
        shutdown_tx.send(false).unwrap();
        tokio::task::yield_now().await;
        gate.add_permits(1);

        for _ in 0..100 {
            if controller.current_snapshot().status == CacheStatus::Ok {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(controller.current_snapshot().status, CacheStatus::Ok);
        assert_eq!(source.call_count(), 1);

        shutdown_tx.send(true).unwrap();
        let summary = job.await.unwrap();
        assert_eq!(summary.cycles, 1);
        assert_eq!(summary.ok, 1);
    }

    #[tokio::test]
    async fn test_dropped_sender_stops_slow_cycle() {
        let (source, _gate) = ScriptedSource::always_ok(Vec::new()).gated();
        let source = Arc::new(source);
        let started = source.started();
        let controller = controller(Arc::clone(&source));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let job = tokio::spawn(refresh_task(controller, SIX_HOURS, shutdown_rx));

        started.notified().await;
        drop(shutdown_tx);

        let summary = tokio::time::timeout(Duration::from_secs(5), job)
            .await
            .expect("refresh task did not stop")
            .unwrap();
        assert_eq!(summary.cycles, 0);
    }

    #[tokio::test]
    async fn test_already_shut_down_does_nothing() {
        let source = Arc::new(ScriptedSource::always_ok(Vec::new()));
        let (_shutdown_tx, shutdown_rx) = watch::channel(true);

        let summary = refresh_task(controller(Arc::clone(&source)), SIX_HOURS, shutdown_rx).await;

        assert_eq!(summary, RefreshJobSummary::default());
        assert_eq!(source.call_count(), 0);
    }
}
