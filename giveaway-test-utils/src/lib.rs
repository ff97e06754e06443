//! GIVEAWAY Test Utilities
//!
//! Shared test infrastructure for the GIVEAWAY workspace:
//! - A scripted metric source with failure and latency injection
//! - Proptest generators for warehouse rows
//! - Fixtures for the common refresh scenarios
//! - Assertions on cache snapshots

// Re-export the in-memory store from its source crate
pub use giveaway_storage::MemorySnapshotStore;

// Re-export core types for convenience
pub use giveaway_core::{
    aggregate, CacheSnapshot, CacheStatus, MetricSample, MetricSource, PersistedSnapshot,
    ProductSeries, SnapshotError, SourceError, Timestamp, WeeklyPoint,
};

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

// ============================================================================
// SCRIPTED SOURCE
// ============================================================================

type Response = Result<Vec<MetricSample>, SourceError>;

#[derive(Debug)]
struct Scripted {
    response: Response,
    delay: Option<Duration>,
}

/// Metric source that replays queued responses.
///
/// Each call takes the next queued response as soon as it starts, so calls
/// receive responses in the order they were made even when they finish out
/// of order. Once the queue is empty the source keeps returning the fallback
/// response (a transport error unless overridden).
#[derive(Debug)]
pub struct ScriptedSource {
    queue: Mutex<VecDeque<Scripted>>,
    fallback: Response,
    delay: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
    started: Arc<Notify>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Err(SourceError::Transport {
                reason: "no scripted response".to_string(),
            }),
            delay: None,
            gate: None,
            started: Arc::new(Notify::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A source that returns the same rows on every call.
    pub fn always_ok(rows: Vec<MetricSample>) -> Self {
        Self::new().otherwise(Ok(rows))
    }

    /// A source that fails the same way on every call.
    pub fn always_err(err: SourceError) -> Self {
        Self::new().otherwise(Err(err))
    }

    /// Queue a successful response.
    pub fn then_ok(self, rows: Vec<MetricSample>) -> Self {
        self.push(Ok(rows), None)
    }

    /// Queue a successful response that takes `delay` to arrive, in place of
    /// the source-wide delay.
    pub fn then_ok_after(self, rows: Vec<MetricSample>, delay: Duration) -> Self {
        self.push(Ok(rows), Some(delay))
    }

    /// Queue a failure.
    pub fn then_err(self, err: SourceError) -> Self {
        self.push(Err(err), None)
    }

    /// Response used once the queue runs dry.
    pub fn otherwise(mut self, response: Response) -> Self {
        self.fallback = response;
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Hold every call until a permit is added to the returned semaphore.
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    /// Notified each time a call starts, before any delay or gate.
    pub fn started(&self) -> Arc<Notify> {
        Arc::clone(&self.started)
    }

    /// Number of calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn push(self, response: Response, delay: Option<Duration>) -> Self {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Scripted { response, delay });
        self
    }
}

impl Default for ScriptedSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricSource for ScriptedSource {
    async fn fetch_samples(&self) -> Result<Vec<MetricSample>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        self.started.notify_one();

        let (response, delay) = match next {
            Some(Scripted { response, delay }) => (response, delay.or(self.delay)),
            None => (self.fallback.clone(), self.delay),
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        response
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating warehouse rows.

    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    /// A Monday within a couple of years of 2024.
    pub fn arb_week_start() -> impl Strategy<Value = NaiveDate> {
        (0i64..104).prop_map(|weeks| fixtures::week(2024, 1, 1) + chrono::Duration::weeks(weeks))
    }

    /// Product key in the `Name (SKU)` shape, without padding.
    pub fn arb_product_key() -> impl Strategy<Value = String> {
        ("[A-Z][a-z]{2,10}", "[A-Z]-[0-9]{1,3}")
            .prop_map(|(name, sku)| format!("{} ({})", name, sku))
    }

    /// Leading/trailing whitespace to wrap around a key.
    pub fn arb_padding() -> impl Strategy<Value = String> {
        prop::collection::vec(prop_oneof![Just(' '), Just('\t')], 0..3)
            .prop_map(|chars| chars.into_iter().collect())
    }

    fn arb_average() -> impl Strategy<Value = Option<f64>> {
        prop::option::of(-5.0f64..500.0)
    }

    /// A row with a non-null key and possibly-null averages.
    pub fn arb_sample() -> impl Strategy<Value = MetricSample> {
        (
            arb_week_start(),
            arb_product_key(),
            arb_padding(),
            arb_padding(),
            arb_average(),
            arb_average(),
            arb_average(),
            0i64..10_000,
        )
            .prop_map(
                |(week_start, key, before, after, avg_overweight, avg_value, avg_target, count)| {
                    MetricSample {
                        week_start,
                        product_key: Some(format!("{}{}{}", before, key, after)),
                        avg_overweight,
                        avg_value,
                        avg_target,
                        sample_count: count,
                    }
                },
            )
    }

    /// Between zero and `max` rows.
    pub fn arb_samples(max: usize) -> impl Strategy<Value = Vec<MetricSample>> {
        prop::collection::vec(arb_sample(), 0..=max)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for the common refresh scenarios.

    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    pub fn week(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
    }

    /// `2024-01-01T00:00:00Z`
    pub fn new_year_2024() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default()
    }

    /// Two Bacon rows that differ only in key padding.
    pub fn bacon_rows() -> Vec<MetricSample> {
        vec![
            MetricSample::new(week(2024, 1, 1), "Bacon ", 1.2, 50.2, 49.0, 10),
            MetricSample::new(week(2024, 1, 1), "Bacon", 0.8, 49.8, 49.0, 8),
        ]
    }

    /// Rows for two products across two weeks.
    pub fn two_product_rows() -> Vec<MetricSample> {
        vec![
            MetricSample::new(week(2024, 1, 1), "Bacon (B-1)", 1.2, 50.2, 49.0, 10),
            MetricSample::new(week(2024, 1, 8), "Bacon (B-1)", 0.9, 49.9, 49.0, 12),
            MetricSample::new(week(2024, 1, 1), "Jerky (J-2)", 0.4, 10.4, 10.0, 4),
        ]
    }

    /// A durable snapshot holding the Bacon series, saved at 2024-01-01.
    pub fn bacon_persisted() -> PersistedSnapshot {
        let data = aggregate(&bacon_rows()).unwrap_or_default();
        PersistedSnapshot::new(data, new_year_2024())
    }

    /// The error every fallback scenario starts from.
    pub fn warehouse_timeout() -> SourceError {
        SourceError::Timeout { seconds: 135 }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on cache snapshots.

    use super::*;

    /// Assert a snapshot has the given status.
    #[track_caller]
    pub fn assert_status(snapshot: &CacheSnapshot, status: CacheStatus) {
        assert_eq!(
            snapshot.status, status,
            "Expected {} snapshot, got {:?}",
            status, snapshot
        );
    }

    /// Assert a snapshot is the stale view of `persisted`.
    #[track_caller]
    pub fn assert_stale_from(snapshot: &CacheSnapshot, persisted: &PersistedSnapshot) {
        assert_status(snapshot, CacheStatus::Stale);
        assert_eq!(snapshot.series, persisted.data);
        assert_eq!(snapshot.refreshed_at, Some(persisted.refreshed_at));
        assert_eq!(snapshot.product_count, persisted.product_count);
        assert!(snapshot.error.is_some(), "Stale snapshot must carry an error");
    }

    /// Assert a snapshot records a failure with no data.
    #[track_caller]
    pub fn assert_failed_empty(snapshot: &CacheSnapshot) {
        assert_status(snapshot, CacheStatus::Error);
        assert!(snapshot.is_empty(), "Expected no data, got {:?}", snapshot.series);
        assert!(snapshot.refreshed_at.is_none());
        assert!(snapshot.error.is_some(), "Error snapshot must carry an error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_source_replays_in_order() {
        let source = ScriptedSource::new()
            .then_ok(fixtures::bacon_rows())
            .then_err(fixtures::warehouse_timeout());

        assert_eq!(source.fetch_samples().await.unwrap().len(), 2);
        assert_eq!(
            source.fetch_samples().await.unwrap_err(),
            fixtures::warehouse_timeout()
        );
        assert!(matches!(
            source.fetch_samples().await,
            Err(SourceError::Transport { .. })
        ));
        assert_eq!(source.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_responses_follow_call_order_not_finish_order() {
        let source = Arc::new(
            ScriptedSource::new()
                .then_ok_after(fixtures::two_product_rows(), Duration::from_secs(10))
                .then_ok_after(fixtures::bacon_rows(), Duration::from_secs(1)),
        );

        let slow = {
            let source = Arc::clone(&source);
            tokio::spawn(async move { source.fetch_samples().await })
        };
        source.started().notified().await;
        let fast = source.fetch_samples().await.unwrap();

        assert_eq!(fast, fixtures::bacon_rows());
        assert!(!slow.is_finished());
        assert_eq!(slow.await.unwrap().unwrap(), fixtures::two_product_rows());
    }

    #[tokio::test]
    async fn test_always_ok_repeats() {
        let source = ScriptedSource::always_ok(fixtures::two_product_rows());
        for _ in 0..3 {
            assert_eq!(source.fetch_samples().await.unwrap().len(), 3);
        }
    }

    #[tokio::test]
    async fn test_gated_source_waits_for_permit() {
        let (source, gate) = ScriptedSource::always_ok(Vec::new()).gated();
        let source = Arc::new(source);
        let started = source.started();

        let task = {
            let source = Arc::clone(&source);
            tokio::spawn(async move { source.fetch_samples().await })
        };

        started.notified().await;
        assert!(!task.is_finished());

        gate.add_permits(1);
        assert!(task.await.unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_bacon_persisted_fixture() {
        let persisted = fixtures::bacon_persisted();
        assert_eq!(persisted.product_count, 1);
        assert_eq!(persisted.data["Bacon"].len(), 2);
        assert_eq!(
            persisted.refreshed_at.to_rfc3339(),
            "2024-01-01T00:00:00+00:00"
        );
    }
}
