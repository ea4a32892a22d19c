//! The single loop that runs queued jobs.
//!
//! Each wake (interval tick or enqueue signal) takes at most one job off the
//! queue and runs it to completion before waiting again, so no two jobs ever
//! execute at the same time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::fs;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::ExecError;
use crate::jobs::config_builder::build_config;
use crate::jobs::executor::{Executor, Invocation};
use crate::jobs::model::{JobId, error_payload};
use crate::jobs::queue::{QueuedJob, WorkQueue};
use crate::jobs::store::JobStore;

/// Handle to a running worker loop.
pub struct WorkerHandle {
    handle: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
    queue: Arc<WorkQueue>,
}

impl WorkerHandle {
    /// Stop the loop. A job already running finishes first; anything still
    /// queued is abandoned and stays pending on disk.
    pub async fn shutdown(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.queue.wake();
        if let Err(e) = self.handle.await {
            error!("Worker task failed during shutdown: {e}");
        }
        info!("Worker stopped");
    }
}

/// Dependencies of the worker loop.
#[derive(Clone)]
pub struct Worker {
    pub store: JobStore,
    pub queue: Arc<WorkQueue>,
    pub executor: Arc<dyn Executor>,
    pub poll_interval: Duration,
}

impl Worker {
    /// Spawn the loop on the current runtime.
    pub fn spawn(self) -> WorkerHandle {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);
        let queue = Arc::clone(&self.queue);

        let handle = tokio::spawn(async move {
            info!(
                "Worker started, polling every {}s",
                self.poll_interval.as_secs_f64()
            );
            let mut tick = tokio::time::interval(self.poll_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = tick.tick() => {}
                    _ = self.queue.wait_for_push() => {}
                }

                if shutdown.load(Ordering::Relaxed) {
                    info!("Worker shutting down");
                    return;
                }

                self.run_once().await;
            }
        });

        WorkerHandle {
            handle,
            shutdown: shutdown_flag,
            queue,
        }
    }

    /// Run the oldest queued job, if any. Returns the id it ran.
    pub async fn run_once(&self) -> Option<JobId> {
        let job = self.queue.pop().await?;
        let id = job.id;
        info!(job_id = %id, "Executing job");

        let result = match self.execute(&job).await {
            Ok(stdout) => stdout.into_bytes(),
            Err(e) => {
                error!(job_id = %id, error = %e, "Job failed");
                error_payload(&e.to_string())
            }
        };

        match self.store.write_result(id, &result).await {
            Ok(()) => info!(job_id = %id, "Job executed"),
            Err(e) => error!(job_id = %id, error = %e, "Failed to write job result"),
        }
        Some(id)
    }

    /// Prepare the job directory and run the tool.
    async fn execute(&self, job: &QueuedJob) -> Result<String, ExecError> {
        let paths = self.store.paths(job.id);
        let config_file = paths.config_file(job.media_type);

        let config =
            build_config(&job.body, job.media_type).map_err(|e| ExecError::Prepare(e.to_string()))?;
        fs::write(&config_file, config).await.map_err(|e| {
            ExecError::Prepare(format!("writing {}: {e}", config_file.display()))
        })?;

        let artifacts_dir = paths.artifacts_dir();
        fs::create_dir_all(&artifacts_dir).await.map_err(|e| {
            ExecError::Prepare(format!("creating {}: {e}", artifacts_dir.display()))
        })?;

        let invocation = Invocation {
            config_file,
            artifacts_dir,
            stderr_file: paths.stderr_file(),
        };
        let output = self.executor.run(&invocation).await?;
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use bytes::Bytes;
    use tempfile::TempDir;

    use super::*;
    use crate::jobs::executor::ExecutionOutput;
    use crate::jobs::model::{JobStatus, MediaType};

    /// Echoes the config file it was handed and records overlap.
    #[derive(Default)]
    struct RecordingExecutor {
        active: AtomicUsize,
        max_active: AtomicUsize,
        runs: AtomicUsize,
    }

    #[async_trait]
    impl Executor for RecordingExecutor {
        async fn run(&self, invocation: &Invocation) -> Result<ExecutionOutput, ExecError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            let config = tokio::fs::read_to_string(&invocation.config_file).await?;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(ExecutionOutput {
                stdout: format!("ran {config}\n"),
                exit_code: Some(0),
            })
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl Executor for FailingExecutor {
        async fn run(&self, _invocation: &Invocation) -> Result<ExecutionOutput, ExecError> {
            Err(ExecError::Spawn {
                program: "bzt".to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        }
    }

    async fn setup(executor: Arc<dyn Executor>) -> (Worker, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(dir.path().join("taurusconfs"));
        store.ensure_root().await.unwrap();
        let worker = Worker {
            store,
            queue: Arc::new(WorkQueue::new()),
            executor,
            poll_interval: Duration::from_millis(10),
        };
        (worker, dir)
    }

    async fn enqueue(worker: &Worker, id: u64, media_type: MediaType, body: &'static [u8]) {
        worker.store.create_job_dir(JobId(id)).await.unwrap();
        worker
            .queue
            .push(QueuedJob {
                id: JobId(id),
                media_type,
                body: Bytes::from_static(body),
            })
            .await;
    }

    #[tokio::test]
    async fn run_once_takes_exactly_one_job() {
        let executor = Arc::new(RecordingExecutor::default());
        let (worker, _dir) = setup(executor.clone()).await;
        enqueue(&worker, 0, MediaType::Json, br#"{"execution":[]}"#).await;
        enqueue(&worker, 1, MediaType::Json, br#"{"execution":[]}"#).await;

        assert_eq!(worker.run_once().await, Some(JobId(0)));
        assert!(matches!(
            worker.store.get(JobId(0)).await.unwrap(),
            JobStatus::Done(_)
        ));
        assert_eq!(worker.store.get(JobId(1)).await.unwrap(), JobStatus::Pending);
        assert_eq!(worker.queue.len().await, 1);
    }

    #[tokio::test]
    async fn run_once_on_empty_queue_is_noop() {
        let (worker, _dir) = setup(Arc::new(RecordingExecutor::default())).await;
        assert_eq!(worker.run_once().await, None);
    }

    #[tokio::test]
    async fn writes_config_artifacts_and_result() {
        let (worker, _dir) = setup(Arc::new(RecordingExecutor::default())).await;
        enqueue(&worker, 0, MediaType::Yaml, b"execution:\n- executor: jmeter\n").await;

        worker.run_once().await;

        let paths = worker.store.paths(JobId(0));
        assert!(paths.config_file(MediaType::Yaml).exists());
        assert!(paths.artifacts_dir().is_dir());
        let JobStatus::Done(result) = worker.store.get(JobId(0)).await.unwrap() else {
            panic!("job should be done");
        };
        let result = String::from_utf8(result).unwrap();
        assert!(result.starts_with("ran "));
        assert!(result.contains("provisioning: local"));
    }

    #[tokio::test]
    async fn executor_failure_becomes_terminal_payload() {
        let (worker, _dir) = setup(Arc::new(FailingExecutor)).await;
        enqueue(&worker, 0, MediaType::Json, b"{}").await;
        enqueue(&worker, 1, MediaType::Json, b"{}").await;

        worker.run_once().await;
        worker.run_once().await;

        for id in [0, 1] {
            let JobStatus::Done(bytes) = worker.store.get(JobId(id)).await.unwrap() else {
                panic!("failed job should still be terminal");
            };
            let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            assert!(value["status"].as_str().unwrap().starts_with("ERROR: "));
        }
    }

    #[tokio::test]
    async fn loop_drains_queue_one_job_at_a_time() {
        let executor = Arc::new(RecordingExecutor::default());
        let (worker, _dir) = setup(executor.clone()).await;
        for id in 0..5 {
            enqueue(&worker, id, MediaType::Json, b"{}").await;
        }

        let store = worker.store.clone();
        let handle = worker.spawn();

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let mut done = 0;
                for id in 0..5 {
                    if matches!(store.get(JobId(id)).await.unwrap(), JobStatus::Done(_)) {
                        done += 1;
                    }
                }
                if done == 5 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("queue did not drain");

        handle.shutdown().await;
        assert_eq!(executor.runs.load(Ordering::SeqCst), 5);
        assert_eq!(executor.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_stops_idle_loop() {
        let (worker, _dir) = setup(Arc::new(RecordingExecutor::default())).await;
        let handle = worker.spawn();
        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .expect("shutdown hung");
    }
}
