//! In-memory job status registry read by pollers.

use crate::job::status::{JobStatus, Progress};
use crate::job::task::JobOutput;
use crate::progress::ProgressSink;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Latest status of every job this process knows about.
///
/// Jobs write into it, pollers read from it; nothing is ever pushed.
#[derive(Default)]
pub struct StatusBoard {
    statuses: RwLock<HashMap<Uuid, JobStatus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status of `job_id`; `Unknown` if it was never registered.
    pub fn poll(&self, job_id: Uuid) -> JobStatus {
        self.statuses
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&job_id)
            .cloned()
            .unwrap_or(JobStatus::Unknown)
    }

    pub fn mark_pending(&self, job_id: Uuid) {
        self.set(job_id, JobStatus::Pending);
    }

    pub fn mark_started(&self, job_id: Uuid, progress: Progress) {
        self.update(job_id, |status| {
            // A late report must not resurrect a finished job.
            if !status.is_terminal() {
                *status = JobStatus::Started { progress };
            }
        });
    }

    pub fn mark_success(&self, job_id: Uuid, output: JobOutput) {
        self.set(job_id, JobStatus::Success { output });
    }

    /// Marks the job failed, keeping its last reported progress.
    pub fn mark_failure(&self, job_id: Uuid, reason: impl Into<String>) {
        let reason = reason.into();
        self.update(job_id, |status| {
            if matches!(status, JobStatus::Success { .. }) {
                return;
            }
            let progress = status.progress().cloned();
            *status = JobStatus::Failure { reason, progress };
        });
    }

    /// Returns a progress sink that records reports for `job_id`.
    pub fn sink_for(self: &Arc<Self>, job_id: Uuid) -> Arc<dyn ProgressSink> {
        Arc::new(JobProgressSink {
            board: Arc::clone(self),
            job_id,
        })
    }

    /// Number of jobs known to the board.
    pub fn len(&self) -> usize {
        self.statuses
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn set(&self, job_id: Uuid, status: JobStatus) {
        self.statuses
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(job_id, status);
    }

    fn update(&self, job_id: Uuid, f: impl FnOnce(&mut JobStatus)) {
        let mut statuses = self
            .statuses
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let status = statuses.entry(job_id).or_insert(JobStatus::Pending);
        f(status);
    }
}

struct JobProgressSink {
    board: Arc<StatusBoard>,
    job_id: Uuid,
}

impl ProgressSink for JobProgressSink {
    fn report(&self, progress: &Progress) {
        self.board.mark_started(self.job_id, progress.clone());
    }
}
