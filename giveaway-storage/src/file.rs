//! File-backed snapshot store.
//!
//! The snapshot is a single JSON document `{data, refreshed_at, product_count}`.
//! Writes go to a uniquely named sibling temp file which is synced and then
//! renamed over the target, so an interrupted write leaves the previous
//! document intact.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use giveaway_core::{PersistedSnapshot, ProductSeries, SnapshotError, Timestamp};
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::SnapshotStore;

/// Borrowing view of [`PersistedSnapshot`] so saving does not clone the series.
#[derive(Serialize)]
struct PersistedSnapshotRef<'a> {
    data: &'a ProductSeries,
    refreshed_at: Timestamp,
    product_count: usize,
}

/// Snapshot store writing one JSON file at a fixed path.
#[derive(Debug)]
pub struct FileSnapshotStore {
    path: PathBuf,
    /// Distinguishes temp files of overlapping saves within one process.
    write_seq: AtomicU64,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_seq: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot".to_string());
        self.path
            .with_file_name(format!(".{}.{}.{}.tmp", file_name, std::process::id(), seq))
    }

    fn io_error(&self, err: std::io::Error) -> SnapshotError {
        SnapshotError::Io {
            path: self.path.display().to_string(),
            reason: err.to_string(),
        }
    }

    async fn write_temp(&self, tmp: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = tokio::fs::File::create(tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(
        &self,
        data: &ProductSeries,
        refreshed_at: Timestamp,
        product_count: usize,
    ) -> Result<(), SnapshotError> {
        let document = PersistedSnapshotRef {
            data,
            refreshed_at,
            product_count,
        };
        let bytes = serde_json::to_vec(&document).map_err(|e| SnapshotError::Encode {
            reason: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let tmp = self.temp_path();
        if let Err(e) = self.write_temp(&tmp, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(self.io_error(e));
        }

        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(self.io_error(e));
        }

        // Persist the rename itself. Not every platform can open a directory.
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Ok(dir) = tokio::fs::File::open(parent).await {
                let _ = dir.sync_all().await;
            }
        }

        tracing::debug!(
            path = %self.path.display(),
            bytes = bytes.len(),
            product_count,
            "Snapshot written"
        );
        Ok(())
    }

    async fn load(&self) -> Result<Option<PersistedSnapshot>, SnapshotError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| SnapshotError::Corrupt {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
