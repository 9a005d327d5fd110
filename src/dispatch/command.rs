//! Out-of-process worker speaking JSON over stdin/stdout.
//!
//! The program is invoked as `command args... <task>`. It receives the sub-job
//! arguments as JSON on stdin and must print the JSON result on stdout. A
//! non-zero exit is a failure; its trimmed stderr becomes the reason.

use crate::dispatch::WorkerFailure;
use crate::dispatch::local::Worker;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Worker that runs an external program per sub-job.
#[derive(Debug, Clone)]
pub struct CommandWorker {
    program: String,
    args: Vec<String>,
}

impl CommandWorker {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Resolves the program to an executable path, searching `PATH` for bare names.
    pub fn resolve_program(&self) -> Option<PathBuf> {
        let program = Path::new(&self.program);
        if program.components().count() > 1 {
            return program.is_file().then(|| program.to_path_buf());
        }
        let path_var = std::env::var_os("PATH")?;
        std::env::split_paths(&path_var)
            .map(|dir| dir.join(program))
            .find(|candidate| candidate.is_file())
    }
}

#[async_trait]
impl Worker for CommandWorker {
    async fn run(&self, task: &str, args: Value) -> Result<Value, WorkerFailure> {
        let payload = serde_json::to_vec(&args)
            .map_err(|e| WorkerFailure::new(format!("failed to encode arguments: {e}")))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(task)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Revoking the sub-job drops this future, which must take the child down too.
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WorkerFailure::new(format!("failed to start {}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| WorkerFailure::new(format!("failed to send arguments: {e}")))?;
            // stdin is dropped here so the worker sees EOF.
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| WorkerFailure::new(format!("{} did not complete: {e}", self.program)))?;
        debug!(program = %self.program, task, status = %output.status, "worker exited");

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = match stderr.trim() {
                "" => format!("{} exited with {}", self.program, output.status),
                message => message.to_string(),
            };
            return Err(WorkerFailure::new(reason));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            WorkerFailure::new(format!("{} returned invalid JSON: {e}", self.program))
        })
    }

    fn is_ready(&self) -> bool {
        self.resolve_program().is_some()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn echoes_stdin_as_result() {
        let dir = TempDir::new().unwrap();
        let worker = CommandWorker::new(script(&dir, "echo.sh", "cat"), vec![]);

        let result = worker
            .run("transcribe_task", json!({"audio_path": "a.wav"}))
            .await
            .unwrap();

        assert_eq!(result, json!({"audio_path": "a.wav"}));
    }

    #[tokio::test]
    async fn task_name_is_last_argument() {
        let dir = TempDir::new().unwrap();
        let body = r#"cat > /dev/null; printf '{"task":"%s","first":"%s"}' "$2" "$1""#;
        let worker = CommandWorker::new(script(&dir, "args.sh", body), vec!["--fast".to_string()]);

        let result = worker.run("punctuation_task", json!({})).await.unwrap();

        assert_eq!(result["task"], "punctuation_task");
        assert_eq!(result["first"], "--fast");
    }

    #[tokio::test]
    async fn non_zero_exit_reports_stderr() {
        let dir = TempDir::new().unwrap();
        let body = "cat > /dev/null; echo 'model not loaded' >&2; exit 3";
        let worker = CommandWorker::new(script(&dir, "fail.sh", body), vec![]);

        let err = worker.run("transcribe_task", json!({})).await.unwrap_err();

        assert_eq!(err.reason, "model not loaded");
    }

    #[tokio::test]
    async fn invalid_json_is_a_failure() {
        let dir = TempDir::new().unwrap();
        let body = "cat > /dev/null; echo 'not json'";
        let worker = CommandWorker::new(script(&dir, "garbage.sh", body), vec![]);

        let err = worker.run("transcribe_task", json!({})).await.unwrap_err();

        assert!(err.reason.contains("invalid JSON"), "{}", err.reason);
    }

    #[tokio::test]
    async fn missing_program_is_not_ready() {
        let worker = CommandWorker::new("/nonexistent/jobscribe-worker", vec![]);
        assert!(!worker.is_ready());
        assert!(worker.run("transcribe_task", json!({})).await.is_err());
    }

    #[test]
    fn existing_program_is_ready() {
        let dir = TempDir::new().unwrap();
        let worker = CommandWorker::new(script(&dir, "ok.sh", "cat"), vec![]);
        assert!(worker.is_ready());
    }
}
