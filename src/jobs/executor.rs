//! Runs the external load-test tool for one job.
//!
//! Invocation: `<bzt> [-v] -o settings.artifacts-dir=<dir> <config-file>`.
//! Stdout becomes the job result; stderr goes to a sibling diagnostics file.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::ExecError;

/// How long a killed tool's stderr may keep draining before it is cut off.
const STDERR_GRACE: Duration = Duration::from_secs(1);

/// Everything needed to run the tool for one job.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub config_file: PathBuf,
    pub artifacts_dir: PathBuf,
    pub stderr_file: PathBuf,
}

/// What the tool produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutput {
    /// Stdout, one `\n` after every line.
    pub stdout: String,
    /// `None` when killed by a signal.
    pub exit_code: Option<i32>,
}

/// Seam between the worker and the process it launches.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<ExecutionOutput, ExecError>;
}

/// Launches the real `bzt` binary.
#[derive(Debug, Clone)]
pub struct TaurusExecutor {
    program: PathBuf,
    verbose: bool,
    timeout: Option<Duration>,
}

impl TaurusExecutor {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            verbose: true,
            timeout: None,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Kill the tool if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Command-line arguments for an invocation.
    pub fn args(&self, invocation: &Invocation) -> Vec<String> {
        let mut args = Vec::with_capacity(4);
        if self.verbose {
            args.push("-v".to_string());
        }
        args.push("-o".to_string());
        args.push(format!(
            "settings.artifacts-dir={}",
            invocation.artifacts_dir.display()
        ));
        args.push(invocation.config_file.display().to_string());
        args
    }
}

#[async_trait]
impl Executor for TaurusExecutor {
    async fn run(&self, invocation: &Invocation) -> Result<ExecutionOutput, ExecError> {
        let program = self.program.display().to_string();
        let args = self.args(invocation);
        debug!(program = %program, args = ?args, "Spawning tool");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecError::Prepare("tool stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExecError::Prepare("tool stderr was not captured".to_string()))?;

        // Drained concurrently so a chatty stderr cannot fill its pipe and stall stdout.
        let captured = Arc::new(Mutex::new(Vec::new()));
        let mut stderr_task = tokio::spawn(drain_into(stderr, Arc::clone(&captured)));

        let run = async {
            let stdout = collect_lines(stdout).await?;
            let status = child.wait().await?;
            Ok::<(String, ExitStatus), std::io::Error>((stdout, status))
        };

        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.ok(),
            None => Some(run.await),
        };

        let Some(result) = outcome else {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill timed-out tool");
            }
            // Descendants of the tool can hold the pipe open; keep what arrived.
            if tokio::time::timeout(STDERR_GRACE, &mut stderr_task).await.is_err() {
                stderr_task.abort();
            }
            save_stderr(&invocation.stderr_file, &captured).await;
            return Err(ExecError::Timeout(self.timeout.unwrap_or_default()));
        };
        let (stdout, status) = result?;

        match stderr_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to read tool stderr"),
            Err(e) => warn!(error = %e, "Stderr reader task failed"),
        }
        save_stderr(&invocation.stderr_file, &captured).await;

        if !status.success() {
            warn!(program = %program, status = %status, "Tool exited unsuccessfully");
        }

        Ok(ExecutionOutput {
            stdout,
            exit_code: status.code(),
        })
    }
}

/// Read until EOF, terminating every line with `\n`. Invalid UTF-8 is
/// replaced rather than failing the job.
async fn collect_lines<R: AsyncRead + Unpin>(reader: R) -> std::io::Result<String> {
    let mut reader = BufReader::new(reader);
    let mut result = String::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        if line.ends_with(b"\n") {
            line.pop();
        }
        if line.ends_with(b"\r") {
            line.pop();
        }
        result.push_str(&String::from_utf8_lossy(&line));
        result.push('\n');
    }

    Ok(result)
}

/// Copy `reader` into `sink` chunk by chunk, so a partial capture survives
/// the task being cut off.
async fn drain_into<R: AsyncRead + Unpin>(
    mut reader: R,
    sink: Arc<Mutex<Vec<u8>>>,
) -> std::io::Result<()> {
    let mut chunk = [0u8; 4096];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        sink.lock().await.extend_from_slice(&chunk[..n]);
    }
}

/// Write captured stderr next to the job, if there was any.
async fn save_stderr(path: &Path, captured: &Mutex<Vec<u8>>) {
    let bytes = captured.lock().await.clone();
    if bytes.is_empty() {
        return;
    }
    let text = String::from_utf8_lossy(&bytes);
    if let Err(e) = tokio::fs::write(path, text.as_bytes()).await {
        warn!(path = %path.display(), error = %e, "Failed to save tool stderr");
    }
}
