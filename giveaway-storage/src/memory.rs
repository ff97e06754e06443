//! In-memory snapshot store for tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use giveaway_core::{PersistedSnapshot, ProductSeries, SnapshotError, Timestamp};
use tokio::sync::RwLock;

use crate::SnapshotStore;

/// What the store currently holds.
#[derive(Debug, Clone)]
enum Slot {
    Empty,
    Saved(PersistedSnapshot),
    Corrupt,
}

/// Snapshot store held in process memory.
///
/// Supports failure injection so callers can exercise persist failures and
/// corrupt snapshots without touching the filesystem.
#[derive(Debug)]
pub struct MemorySnapshotStore {
    slot: RwLock<Slot>,
    fail_saves: AtomicBool,
    saves: AtomicU64,
    loads: AtomicU64,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::from_slot(Slot::Empty)
    }

    /// A store that already holds a snapshot, as if a previous process saved it.
    pub fn with_snapshot(snapshot: PersistedSnapshot) -> Self {
        Self::from_slot(Slot::Saved(snapshot))
    }

    /// A store whose content cannot be decoded.
    pub fn corrupt() -> Self {
        Self::from_slot(Slot::Corrupt)
    }

    fn from_slot(slot: Slot) -> Self {
        Self {
            slot: RwLock::new(slot),
            fail_saves: AtomicBool::new(false),
            saves: AtomicU64::new(0),
            loads: AtomicU64::new(0),
        }
    }

    /// Make subsequent saves fail with an I/O error.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of save attempts, including failed ones.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    /// The currently stored snapshot, if any.
    pub async fn stored(&self) -> Option<PersistedSnapshot> {
        match &*self.slot.read().await {
            Slot::Saved(snapshot) => Some(snapshot.clone()),
            Slot::Empty | Slot::Corrupt => None,
        }
    }
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(
        &self,
        data: &ProductSeries,
        refreshed_at: Timestamp,
        product_count: usize,
    ) -> Result<(), SnapshotError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(SnapshotError::Io {
                path: self.describe(),
                reason: "injected save failure".to_string(),
            });
        }

        *self.slot.write().await = Slot::Saved(PersistedSnapshot {
            data: data.clone(),
            refreshed_at,
            product_count,
        });
        Ok(())
    }

    async fn load(&self) -> Result<Option<PersistedSnapshot>, SnapshotError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        match &*self.slot.read().await {
            Slot::Empty => Ok(None),
            Slot::Saved(snapshot) => Ok(Some(snapshot.clone())),
            Slot::Corrupt => Err(SnapshotError::Corrupt {
                path: self.describe(),
                reason: "injected corrupt snapshot".to_string(),
            }),
        }
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_empty_store_loads_none() {
        let store = MemorySnapshotStore::new();
        assert_eq!(store.load().await.unwrap(), None);
        assert_eq!(store.load_count(), 1);
    }

    #[tokio::test]
    async fn test_injected_save_failure_keeps_previous() {
        let previous = PersistedSnapshot::new(ProductSeries::new(), Utc::now());
        let store = MemorySnapshotStore::with_snapshot(previous.clone());
        store.set_fail_saves(true);

        assert!(store.save(&ProductSeries::new(), Utc::now(), 0).await.is_err());
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.stored().await, Some(previous));
    }

    #[tokio::test]
    async fn test_corrupt_store_errors_on_load() {
        let store = MemorySnapshotStore::corrupt();
        assert!(matches!(
            store.load().await,
            Err(SnapshotError::Corrupt { .. })
        ));
    }
}
