//! Property tests for refresh cycles over generated warehouse rows.

use std::sync::Arc;

use giveaway_api::CacheController;
use giveaway_core::CacheStatus;
use giveaway_test_utils::generators::arb_samples;
use giveaway_test_utils::{MemorySnapshotStore, ScriptedSource};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A successful refresh serves exactly what it saved, with a product
    /// count matching the series and one point per row.
    #[test]
    fn prop_refresh_serves_what_it_saved(rows in arb_samples(40)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = Arc::new(MemorySnapshotStore::new());
            let controller = CacheController::new(
                Arc::new(ScriptedSource::always_ok(rows.clone())),
                store.clone(),
            );

            let snapshot = controller.refresh().await;

            prop_assert_eq!(snapshot.status, CacheStatus::Ok);
            prop_assert_eq!(snapshot.product_count, snapshot.series.len());

            let points: usize = snapshot.series.values().map(Vec::len).sum();
            prop_assert_eq!(points, rows.len());
            for key in snapshot.series.keys() {
                prop_assert_eq!(key.as_str(), key.trim());
            }

            let stored = store.stored().await;
            prop_assert!(stored.is_some());
            let stored = stored.unwrap();
            prop_assert_eq!(&stored.data, &snapshot.series);
            prop_assert_eq!(stored.product_count, snapshot.product_count);
            prop_assert_eq!(Some(stored.refreshed_at), snapshot.refreshed_at);
            Ok(())
        })?;
    }

    /// After a failure the served series is the last good one, whatever rows
    /// produced it.
    #[test]
    fn prop_failure_after_success_serves_last_good(rows in arb_samples(20)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let source = ScriptedSource::new()
                .then_ok(rows)
                .then_err(giveaway_test_utils::fixtures::warehouse_timeout());
            let controller = CacheController::new(
                Arc::new(source),
                Arc::new(MemorySnapshotStore::new()),
            );

            let good = controller.refresh().await;
            let stale = controller.refresh().await;

            prop_assert_eq!(stale.status, CacheStatus::Stale);
            prop_assert_eq!(&stale.series, &good.series);
            prop_assert_eq!(stale.refreshed_at, good.refreshed_at);
            prop_assert_eq!(stale.product_count, good.product_count);
            Ok(())
        })?;
    }
}
