//! GIVEAWAY Storage - Durable Snapshot Store
//!
//! The cache keeps its last good result on disk so that a restarted process
//! (or a refresh that fails) has something to serve. This crate defines the
//! [`SnapshotStore`] contract and two implementations:
//!
//! - [`FileSnapshotStore`]: one JSON document, replaced by write-then-rename
//! - [`MemorySnapshotStore`]: in-process store for tests

use async_trait::async_trait;
use giveaway_core::{PersistedSnapshot, ProductSeries, SnapshotError, Timestamp};

pub mod file;
pub mod memory;

pub use file::FileSnapshotStore;
pub use memory::MemorySnapshotStore;

/// Persistence for the last successful cache snapshot.
///
/// Implementations must make `save` atomic with respect to `load`: a reader
/// sees either the previous document or the new one, never a partial write.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Replace the durable snapshot.
    async fn save(
        &self,
        data: &ProductSeries,
        refreshed_at: Timestamp,
        product_count: usize,
    ) -> Result<(), SnapshotError>;

    /// Read the durable snapshot.
    ///
    /// Returns `Ok(None)` when nothing has been saved yet. Content that
    /// exists but cannot be decoded is [`SnapshotError::Corrupt`].
    async fn load(&self) -> Result<Option<PersistedSnapshot>, SnapshotError>;

    /// Human-readable location, used in log lines.
    fn describe(&self) -> String;
}
