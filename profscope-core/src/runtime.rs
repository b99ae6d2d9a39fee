//! Managed subprocess execution for the prediction and training scripts.
//!
//! Scripts are run as `{program} {script}` with piped stdio. A JSON payload,
//! when given, is written to stdin and stdout is read back after exit. Every
//! run is bounded by a wall-clock deadline; on expiry the child is killed.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Why a script run did not produce usable output.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
    #[error("Failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("Script exited with status {}", exit_label(.code))]
    Exited { code: Option<i32>, stderr: String },

    #[error("Invalid JSON output: {message}")]
    InvalidOutput { message: String },

    #[error("Script timed out after {}s", .timeout.as_secs())]
    Timeout { timeout: Duration },
}

fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

/// Captured result of a script that exited successfully.
#[derive(Debug, Clone)]
pub struct ScriptOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs one script with a fixed interpreter and working directory.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    program: String,
    script: PathBuf,
    working_dir: PathBuf,
}

impl ScriptRunner {
    pub fn new(
        program: impl Into<String>,
        script: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            script: script.into(),
            working_dir: working_dir.into(),
        }
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    /// Run with `input` serialized to stdin and decode stdout as `T`.
    pub async fn run_json<I, T>(&self, input: &I, timeout: Duration) -> Result<T, ScriptError>
    where
        I: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_vec(input).map_err(|e| ScriptError::InvalidOutput {
            message: format!("Failed to encode input: {e}"),
        })?;
        let output = self.run(Some(payload), timeout).await?;
        serde_json::from_str(output.stdout.trim()).map_err(|e| ScriptError::InvalidOutput {
            message: e.to_string(),
        })
    }

    /// Run with no stdin payload and return the captured output.
    pub async fn run_plain(&self, timeout: Duration) -> Result<ScriptOutput, ScriptError> {
        self.run(None, timeout).await
    }

    async fn run(
        &self,
        stdin: Option<Vec<u8>>,
        timeout: Duration,
    ) -> Result<ScriptOutput, ScriptError> {
        debug!(
            program = %self.program,
            script = %self.script.display(),
            timeout_secs = timeout.as_secs_f64(),
            "Running script"
        );

        let result = tokio::time::timeout(timeout, async {
            let mut child = Command::new(&self.program)
                .arg(&self.script)
                .current_dir(&self.working_dir)
                .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| ScriptError::Spawn {
                    program: self.program.clone(),
                    message: e.to_string(),
                })?;

            if let (Some(payload), Some(mut pipe)) = (stdin, child.stdin.take()) {
                // A script that exits without reading stdin closes the pipe early.
                if let Err(e) = pipe.write_all(&payload).await
                    && e.kind() != std::io::ErrorKind::BrokenPipe
                {
                    warn!(error = %e, "Failed to write script input");
                }
                drop(pipe);
            }

            let output = child.wait_with_output().await.map_err(|e| ScriptError::Spawn {
                program: self.program.clone(),
                message: e.to_string(),
            })?;

            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            if !output.status.success() {
                return Err(ScriptError::Exited {
                    code: output.status.code(),
                    stderr,
                });
            }
            Ok(ScriptOutput { stdout, stderr })
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => {
                warn!(
                    script = %self.script.display(),
                    timeout_secs = timeout.as_secs(),
                    "Script timed out, killed"
                );
                Err(ScriptError::Timeout { timeout })
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::time::Instant;

    fn runner_for(dir: &tempfile::TempDir, body: &str) -> ScriptRunner {
        let path = dir.path().join("script.sh");
        std::fs::write(&path, body).unwrap();
        ScriptRunner::new("sh", path, dir.path())
    }

    #[tokio::test]
    async fn test_run_json_reads_stdin_and_decodes_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_for(&dir, "cat\n");
        let out: Value = runner
            .run_json(&serde_json::json!({"professor": "A. Smith"}), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out["professor"], "A. Smith");
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_code() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_for(&dir, "echo boom >&2\nexit 3\n");
        let err = runner.run_plain(Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(
            err,
            ScriptError::Exited {
                code: Some(3),
                stderr: "boom\n".into()
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_json_output() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_for(&dir, "cat >/dev/null\necho not-json\n");
        let err = runner
            .run_json::<_, Value>(&serde_json::json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptError::InvalidOutput { .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_child_promptly() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_for(&dir, "exec sleep 5\n");
        let start = Instant::now();
        let err = runner.run_plain(Duration::from_millis(200)).await.unwrap_err();
        assert!(matches!(err, ScriptError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptRunner::new("definitely-not-a-real-binary", "x.py", dir.path());
        let err = runner.run_plain(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ScriptError::Spawn { .. }));
    }
}
