//! Filesystem-backed job store.
//!
//! Each job owns `<root>/<id>/`. Nothing about a job is kept in memory; its
//! status is re-derived from the directory contents on every lookup.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::error::StoreError;
use crate::jobs::model::{JobId, JobPaths, JobState, JobStatus, derive_state};

/// Store rooted at a single directory.
#[derive(Debug, Clone)]
pub struct JobStore {
    root: PathBuf,
}

impl JobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn paths(&self, id: JobId) -> JobPaths {
        JobPaths::new(&self.root, id)
    }

    /// Create the store root if missing.
    pub async fn ensure_root(&self) -> Result<(), StoreError> {
        info!(root = %self.root.display(), "Using job store root");
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StoreError::io(&self.root, e))
    }

    /// Create a job's directory. Fails if it already exists, so an id can
    /// never be admitted twice.
    pub async fn create_job_dir(&self, id: JobId) -> Result<JobPaths, StoreError> {
        let paths = self.paths(id);
        match fs::create_dir(&paths.directory).await {
            Ok(()) => Ok(paths),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                error!(job_id = %id, "Job directory already exists");
                Err(StoreError::JobExists(id))
            }
            Err(e) => Err(StoreError::io(&paths.directory, e)),
        }
    }

    /// Persist a job's terminal result.
    pub async fn write_result(&self, id: JobId, body: &[u8]) -> Result<(), StoreError> {
        let path = self.paths(id).result_file();
        fs::write(&path, body)
            .await
            .map_err(|e| StoreError::io(&path, e))
    }

    /// Look up a job's status.
    pub async fn get(&self, id: JobId) -> Result<JobStatus, StoreError> {
        let paths = self.paths(id);
        let result_file = paths.result_file();

        let dir_exists = fs::try_exists(&paths.directory)
            .await
            .map_err(|e| StoreError::io(&paths.directory, e))?;
        let result_exists = fs::try_exists(&result_file)
            .await
            .map_err(|e| StoreError::io(&result_file, e))?;

        match derive_state(dir_exists, result_exists) {
            JobState::NotFound => Ok(JobStatus::NotFound),
            JobState::Pending => Ok(JobStatus::Pending),
            JobState::Done => match fs::read(&result_file).await {
                Ok(bytes) => Ok(JobStatus::Done(bytes)),
                // Removed by a concurrent cleanup between the check and the read.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(JobStatus::NotFound),
                Err(e) => Err(StoreError::io(&result_file, e)),
            },
        }
    }

    /// Ids of all job directories, ascending. `None` if the root is missing.
    ///
    /// Only directories named by a canonical id count; `007` or `+5` are
    /// not jobs.
    pub async fn list(&self) -> Result<Option<Vec<JobId>>, StoreError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&self.root, e)),
        };

        let mut ids: Vec<JobId> = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.root, e))?
        {
            // Entries can vanish mid-enumeration when cleanup runs concurrently.
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if !file_type.is_dir() {
                continue;
            }
            if let Some(id) = entry.file_name().to_str().and_then(|n| n.parse().ok()) {
                ids.push(id);
            }
        }

        ids.sort();
        Ok(Some(ids))
    }

    /// Highest id backed by an existing job directory.
    pub async fn max_existing_id(&self) -> Result<Option<JobId>, StoreError> {
        Ok(self.list().await?.and_then(|ids| ids.last().copied()))
    }

    /// Delete every job directory and its contents, children before parents.
    ///
    /// Failures are logged per entry and do not stop the sweep. Loose files in
    /// the root (the id marker) are kept.
    pub async fn cleanup(&self) {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                error!(root = %self.root.display(), error = %e, "Failed to list job store");
                return;
            }
        };

        let mut job_dirs = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                        job_dirs.push(entry.path());
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Failed to read job store entry");
                    break;
                }
            }
        }

        for dir in job_dirs {
            remove_tree(&dir).await;
        }
    }
}

/// Remove `dir` depth-first, logging and skipping entries that fail.
async fn remove_tree(dir: &Path) {
    let mut paths = vec![dir.to_path_buf()];
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = match fs::read_dir(&current).await {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    error!(path = %current.display(), error = %e, "Failed to walk directory");
                }
                continue;
            }
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                pending.push(path.clone());
            }
            paths.push(path);
        }
    }

    // Reverse lexical order puts every child ahead of its parent.
    paths.sort_by(|a, b| b.cmp(a));

    for path in paths {
        warn!(path = %path.display(), "Removing");
        let is_dir = fs::symlink_metadata(&path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        let removed = if is_dir {
            fs::remove_dir(&path).await
        } else {
            fs::remove_file(&path).await
        };
        match removed {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Already removed");
            }
            Err(e) => error!(path = %path.display(), error = %e, "Failed to remove"),
        }
    }
}
