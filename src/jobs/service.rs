//! The single entry point the HTTP layer talks to.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::{IdStrategy, ServiceConfig};
use crate::error::{JobError, StoreError};
use crate::jobs::admission::{Admission, AdmissionController};
use crate::jobs::config_builder::parse_document;
use crate::jobs::executor::{Executor, TaurusExecutor};
use crate::jobs::ids::{FileIds, IdAllocator, MemoryIds};
use crate::jobs::model::{JobId, JobStatus, MediaType};
use crate::jobs::queue::{QueuedJob, WorkQueue};
use crate::jobs::store::JobStore;
use crate::jobs::worker::{Worker, WorkerHandle};

/// Owns the store, id allocator, queue and executor.
pub struct JobService {
    store: JobStore,
    ids: Box<dyn IdAllocator>,
    admission: AdmissionController,
    queue: Arc<WorkQueue>,
    executor: Arc<dyn Executor>,
    poll_interval: Duration,
    /// Serializes allocate → admit → enqueue across concurrent submitters.
    submit_lock: Mutex<()>,
}

impl JobService {
    /// Build the service from configuration, creating the store root.
    pub async fn from_config(config: &ServiceConfig) -> Result<Self, StoreError> {
        let executor = TaurusExecutor::new(config.bzt_cmd.clone())
            .with_verbose(config.verbose)
            .with_timeout(config.tool_timeout);
        Self::with_executor(config, Arc::new(executor)).await
    }

    /// Build the service around a custom executor.
    pub async fn with_executor(
        config: &ServiceConfig,
        executor: Arc<dyn Executor>,
    ) -> Result<Self, StoreError> {
        let store = JobStore::new(config.store_root());
        store.ensure_root().await?;

        let ids: Box<dyn IdAllocator> = match config.id_strategy {
            IdStrategy::File => Box::new(FileIds::new(store.clone())),
            IdStrategy::Memory => Box::new(MemoryIds::for_store(&store).await?),
        };

        Ok(Self {
            admission: AdmissionController::new(store.clone(), config.task_limit),
            store,
            ids,
            queue: Arc::new(WorkQueue::new()),
            executor,
            poll_interval: config.poll_interval,
            submit_lock: Mutex::new(()),
        })
    }

    /// Start the execution worker. Call once.
    pub fn start(&self) -> WorkerHandle {
        self.worker().spawn()
    }

    /// A worker sharing this service's queue and store, not yet running.
    pub fn worker(&self) -> Worker {
        Worker {
            store: self.store.clone(),
            queue: Arc::clone(&self.queue),
            executor: Arc::clone(&self.executor),
            poll_interval: self.poll_interval,
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.len().await
    }

    /// Accept a test document and return its job id.
    ///
    /// Malformed documents are rejected before an id is spent. A full queue
    /// still yields an id; its result is the overflow error.
    pub async fn submit(&self, body: Bytes, media_type: MediaType) -> Result<JobId, JobError> {
        parse_document(&body, media_type)?;

        let _guard = self.submit_lock.lock().await;
        let id = self.ids.next().await?;
        let queue_len = self.queue.len().await;

        let admission = self
            .admission
            .admit(id, queue_len)
            .await
            .map_err(|source| JobError::Store { id, source })?;

        match admission {
            Admission::Accepted => {
                self.queue
                    .push(QueuedJob {
                        id,
                        media_type,
                        body,
                    })
                    .await;
                info!(job_id = %id, media_type = %media_type, "Added job");
            }
            Admission::Rejected(reason) => {
                info!(job_id = %id, reason = %reason, "Job rejected at admission");
            }
        }

        Ok(id)
    }

    pub async fn get(&self, id: JobId) -> Result<JobStatus, StoreError> {
        self.store.get(id).await
    }

    /// All job ids, or `None` if the store root is gone.
    pub async fn list(&self) -> Result<Option<Vec<JobId>>, StoreError> {
        self.store.list().await
    }

    /// Delete every job directory.
    pub async fn cleanup(&self) {
        self.store.cleanup().await;
    }
}
