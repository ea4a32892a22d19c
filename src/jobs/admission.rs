//! Admission control. Creates the job directory and enforces queue depth.

use tracing::{error, warn};

use crate::error::StoreError;
use crate::jobs::model::{JobId, error_payload};
use crate::jobs::store::JobStore;

/// Message recorded for jobs turned away by a full queue.
pub const QUEUE_OVERFLOW_MESSAGE: &str = "Task Queue Overflow. Try again later";

/// Outcome of admitting a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Caller should enqueue the job.
    Accepted,
    /// A terminal error result has already been written.
    Rejected(String),
}

/// Decides whether a newly allocated job may join the queue.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    store: JobStore,
    /// Maximum queue depth; zero disables the limit.
    limit: usize,
}

impl AdmissionController {
    pub fn new(store: JobStore, limit: usize) -> Self {
        Self { store, limit }
    }

    /// Create the job directory, then reject if the queue is full.
    ///
    /// The directory stays even on rejection; the id is spent and the
    /// overflow error is readable at it.
    pub async fn admit(&self, id: JobId, queue_len: usize) -> Result<Admission, StoreError> {
        self.store.create_job_dir(id).await?;

        if self.limit != 0 && queue_len >= self.limit {
            self.store
                .write_result(id, &error_payload(QUEUE_OVERFLOW_MESSAGE))
                .await?;
            error!(limit = self.limit, queue_len, "{}", QUEUE_OVERFLOW_MESSAGE);
            warn!(job_id = %id, "Job NOT executed");
            return Ok(Admission::Rejected(QUEUE_OVERFLOW_MESSAGE.to_string()));
        }

        Ok(Admission::Accepted)
    }
}
