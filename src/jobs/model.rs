//! Job identifiers, media types, on-disk layout, and derived status.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{InvalidJobId, JobError};

/// File name of the terminal result inside a job directory.
pub const RESULT_FILE: &str = "result";
/// Directory the tool writes its own artifacts into.
pub const ARTIFACTS_DIR: &str = "artifacts-dir";
/// Captured standard error of the tool, written when non-empty.
pub const STDERR_FILE: &str = "stderr.log";

/// Content types accepted on submission.
pub const ACCEPTED_CONTENT_TYPES: &[&str] = &[
    "application/json",
    "text/yaml",
    "application/yaml",
    "application/x-yaml",
];

/// Unique, monotonically increasing job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u64);

impl JobId {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Only the canonical decimal form is accepted (no sign, padding or
/// leading zeros), so a parsed id always round-trips to the same directory.
impl FromStr for JobId {
    type Err = InvalidJobId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidJobId(s.to_string());
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if s.len() > 1 && s.starts_with('0') {
            return Err(invalid());
        }
        s.parse().map(Self).map_err(|_| invalid())
    }
}

/// Format of a submitted document and of the config generated from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Json,
    Yaml,
}

impl MediaType {
    /// Derive the media type from a `Content-Type` header value.
    ///
    /// Parameters (`; charset=...`) are ignored. `application/json` maps to
    /// JSON, the YAML variants map to YAML, anything else is rejected.
    pub fn from_content_type(content_type: &str) -> Result<Self, JobError> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if !ACCEPTED_CONTENT_TYPES.contains(&essence.as_str()) {
            return Err(JobError::UnsupportedMediaType(content_type.to_string()));
        }

        if essence == "application/json" {
            Ok(Self::Json)
        } else {
            Ok(Self::Yaml)
        }
    }

    /// File extension of the generated config file.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yml",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("JSON"),
            Self::Yaml => f.write_str("YAML"),
        }
    }
}

/// Paths belonging to one job inside the store.
#[derive(Debug, Clone)]
pub struct JobPaths {
    pub id: JobId,
    pub directory: PathBuf,
}

impl JobPaths {
    pub fn new(root: &Path, id: JobId) -> Self {
        Self {
            id,
            directory: root.join(id.to_string()),
        }
    }

    pub fn config_file(&self, media_type: MediaType) -> PathBuf {
        self.directory
            .join(format!("test.{}", media_type.extension()))
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.directory.join(ARTIFACTS_DIR)
    }

    pub fn result_file(&self) -> PathBuf {
        self.directory.join(RESULT_FILE)
    }

    pub fn stderr_file(&self) -> PathBuf {
        self.directory.join(STDERR_FILE)
    }
}

/// Observable state of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// No directory for this id.
    NotFound,
    /// Directory exists but no result yet. Queued and running look the same.
    Pending,
    /// Result file exists; holds its raw bytes.
    Done(Vec<u8>),
}

/// Coarse state derived purely from file existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    NotFound,
    Pending,
    Done,
}

/// Derive a job's state from what exists on disk.
///
/// A result without a directory cannot happen on a real filesystem; it is
/// still reported as `Done` since the result is the terminal signal.
pub fn derive_state(dir_exists: bool, result_exists: bool) -> JobState {
    match (dir_exists, result_exists) {
        (_, true) => JobState::Done,
        (true, false) => JobState::Pending,
        (false, false) => JobState::NotFound,
    }
}

/// Terminal payload written for a job that never produced tool output.
pub fn error_payload(message: &str) -> Vec<u8> {
    serde_json::json!({ "status": format!("ERROR: {message}") })
        .to_string()
        .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_derivation_table() {
        assert_eq!(derive_state(false, false), JobState::NotFound);
        assert_eq!(derive_state(true, false), JobState::Pending);
        assert_eq!(derive_state(true, true), JobState::Done);
        assert_eq!(derive_state(false, true), JobState::Done);
    }

    #[test]
    fn media_type_from_content_type() {
        assert_eq!(
            MediaType::from_content_type("application/json").unwrap(),
            MediaType::Json
        );
        assert_eq!(
            MediaType::from_content_type("application/json; charset=UTF-8").unwrap(),
            MediaType::Json
        );
        assert_eq!(
            MediaType::from_content_type("text/yaml").unwrap(),
            MediaType::Yaml
        );
        assert_eq!(
            MediaType::from_content_type("Application/X-YAML").unwrap(),
            MediaType::Yaml
        );
        assert!(matches!(
            MediaType::from_content_type("text/plain"),
            Err(JobError::UnsupportedMediaType(_))
        ));
    }

    #[test]
    fn job_paths_layout() {
        let paths = JobPaths::new(Path::new("/tmp/taurusconfs"), JobId(7));
        assert_eq!(paths.directory, PathBuf::from("/tmp/taurusconfs/7"));
        assert_eq!(
            paths.config_file(MediaType::Json),
            PathBuf::from("/tmp/taurusconfs/7/test.json")
        );
        assert_eq!(
            paths.config_file(MediaType::Yaml),
            PathBuf::from("/tmp/taurusconfs/7/test.yml")
        );
        assert_eq!(
            paths.artifacts_dir(),
            PathBuf::from("/tmp/taurusconfs/7/artifacts-dir")
        );
        assert_eq!(paths.result_file(), PathBuf::from("/tmp/taurusconfs/7/result"));
    }

    #[test]
    fn error_payload_is_status_json() {
        let payload = error_payload("Task Queue Overflow. Try again later");
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(
            value["status"],
            "ERROR: Task Queue Overflow. Try again later"
        );
    }

    #[test]
    fn job_id_parses_and_displays() {
        assert_eq!("42".parse::<JobId>().unwrap(), JobId(42));
        assert!("-1".parse::<JobId>().is_err());
        assert!("abc".parse::<JobId>().is_err());
        assert_eq!("0".parse::<JobId>().unwrap(), JobId(0));
        assert_eq!(JobId(3).next().to_string(), "4");
    }

    #[test]
    fn job_id_rejects_non_canonical_forms() {
        for raw in ["007", "+5", " 5", "5 ", "", "99999999999999999999999"] {
            assert!(raw.parse::<JobId>().is_err(), "{raw:?} should not parse");
        }
    }
}
