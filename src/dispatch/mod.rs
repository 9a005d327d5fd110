//! Sub-job dispatch onto named capability queues.
//!
//! The orchestrator only talks to the [`Dispatcher`] trait: submit work to a
//! queue, block on a handle until the worker reports back, revoke handles it no
//! longer wants, and ask which capabilities are currently served.

pub mod command;
pub mod local;

pub use command::CommandWorker;
pub use local::{FnWorker, LocalDispatcher, Worker};

use crate::error::Result;
use crate::job::status::SubJobState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Opaque reference to a dispatched sub-job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    id: Uuid,
    task: String,
    queue: String,
}

impl JobHandle {
    pub fn new(task: &str, queue: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            task: task.to_string(),
            queue: queue.to_string(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}[{}]", self.task, self.queue, self.id)
    }
}

/// Failure reported by a worker for one sub-job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct WorkerFailure {
    pub reason: String,
}

impl WorkerFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Queue-backed sub-job dispatch.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Enqueue `task` with `args` on `queue`.
    ///
    /// Worker-side failures never surface here; they come back from [`wait`].
    ///
    /// [`wait`]: Dispatcher::wait
    async fn submit(&self, task: &str, queue: &str, args: serde_json::Value)
    -> Result<JobHandle>;

    /// Block until the sub-job finishes and return its result.
    ///
    /// A handle is consumed by its first `wait`; later calls fail.
    async fn wait(
        &self,
        handle: &JobHandle,
    ) -> std::result::Result<serde_json::Value, WorkerFailure>;

    /// Current state of a sub-job, without blocking.
    async fn status(&self, handle: &JobHandle) -> SubJobState;

    /// Best-effort cancellation of a queued or running sub-job.
    async fn revoke(&self, handle: &JobHandle);

    /// Names of the capabilities that currently have at least one live worker.
    async fn active_capabilities(&self) -> Result<HashSet<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_unique() {
        let a = JobHandle::new("transcribe_task", "stt");
        let b = JobHandle::new("transcribe_task", "stt");
        assert_ne!(a, b);
        assert_eq!(a.task(), "transcribe_task");
        assert_eq!(a.queue(), "stt");
    }

    #[test]
    fn handle_display_names_task_and_queue() {
        let handle = JobHandle::new("diarization_task", "diarization");
        let shown = handle.to_string();
        assert!(shown.starts_with("diarization_task@diarization["), "{shown}");
    }

    #[test]
    fn worker_failure_displays_reason() {
        assert_eq!(WorkerFailure::new("out of memory").to_string(), "out of memory");
    }
}
