//! Job identifier allocation.
//!
//! Two strategies share the [`IdAllocator`] trait:
//! - [`MemoryIds`]: atomic counter, lost on restart but seeded past any
//!   job directory already on disk.
//! - [`FileIds`]: persists the last issued id in `<root>/last` and resumes
//!   from it after a restart.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::jobs::model::JobId;
use crate::jobs::store::JobStore;

/// Name of the persisted marker file inside the store root.
pub const LAST_ID_FILE: &str = "last";

/// Hands out monotonically increasing job ids.
#[async_trait]
pub trait IdAllocator: Send + Sync {
    async fn next(&self) -> Result<JobId, StoreError>;
}

/// In-memory counter.
#[derive(Debug)]
pub struct MemoryIds {
    next: AtomicU64,
}

impl MemoryIds {
    /// Start issuing at `first`.
    pub fn starting_at(first: JobId) -> Self {
        Self {
            next: AtomicU64::new(first.0),
        }
    }

    /// Start one past the highest job directory in `store`, or at zero.
    pub async fn for_store(store: &JobStore) -> Result<Self, StoreError> {
        let first = store
            .max_existing_id()
            .await?
            .map(JobId::next)
            .unwrap_or(JobId(0));
        debug!(first = %first, "In-memory id allocator seeded");
        Ok(Self::starting_at(first))
    }
}

#[async_trait]
impl IdAllocator for MemoryIds {
    async fn next(&self) -> Result<JobId, StoreError> {
        Ok(JobId(self.next.fetch_add(1, Ordering::SeqCst)))
    }
}

/// Counter persisted in the store root.
#[derive(Debug)]
pub struct FileIds {
    store: JobStore,
    marker: PathBuf,
    lock: Mutex<()>,
}

impl FileIds {
    pub fn new(store: JobStore) -> Self {
        let marker = store.root().join(LAST_ID_FILE);
        Self {
            store,
            marker,
            lock: Mutex::new(()),
        }
    }

    /// Last id recorded in the marker, if any.
    async fn read_marker(&self) -> Result<Option<JobId>, StoreError> {
        let contents = match fs::read_to_string(&self.marker).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&self.marker, e)),
        };

        let first_line = contents.lines().next().unwrap_or_default().trim();
        if first_line.is_empty() {
            return Ok(None);
        }
        first_line
            .parse::<u64>()
            .map(|n| Some(JobId(n)))
            .map_err(|_| StoreError::CorruptIdMarker {
                path: self.marker.clone(),
                contents,
            })
    }
}

#[async_trait]
impl IdAllocator for FileIds {
    /// Issue one past both the marker and the highest job directory, so a
    /// marker left behind by another allocator never reuses an id.
    async fn next(&self) -> Result<JobId, StoreError> {
        let _guard = self.lock.lock().await;

        let marker = self.read_marker().await?;
        let on_disk = self.store.max_existing_id().await?;
        if let (Some(m), Some(d)) = (marker, on_disk) {
            if d > m {
                warn!(marker = %m, highest_dir = %d, "Id marker is behind job directories");
            }
        }
        let id = marker
            .max(on_disk)
            .map(JobId::next)
            .unwrap_or(JobId(0));

        fs::write(&self.marker, id.to_string())
            .await
            .map_err(|e| StoreError::io(&self.marker, e))?;
        Ok(id)
    }
}
