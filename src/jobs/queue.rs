//! FIFO of admitted jobs waiting for the worker.

use std::collections::VecDeque;

use bytes::Bytes;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::jobs::model::{JobId, MediaType};

/// A job waiting to be executed.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: JobId,
    pub media_type: MediaType,
    pub body: Bytes,
}

/// Multi-producer, single-consumer FIFO with an enqueue signal.
#[derive(Debug, Default)]
pub struct WorkQueue {
    jobs: Mutex<VecDeque<QueuedJob>>,
    enqueued: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job and wake the worker.
    pub async fn push(&self, job: QueuedJob) {
        let depth = {
            let mut jobs = self.jobs.lock().await;
            jobs.push_back(job);
            jobs.len()
        };
        debug!(depth, "Job enqueued");
        self.enqueued.notify_one();
    }

    /// Remove the oldest job.
    pub async fn pop(&self) -> Option<QueuedJob> {
        self.jobs.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    /// Resolves after the next `push` (or immediately if one happened since
    /// the last wait).
    pub async fn wait_for_push(&self) {
        self.enqueued.notified().await;
    }

    /// Wake a waiter without enqueueing anything.
    pub(crate) fn wake(&self) {
        self.enqueued.notify_one();
    }
}
