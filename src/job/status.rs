//! Job and sub-job states as observed by pollers.

use crate::job::task::JobOutput;
use serde::{Deserialize, Serialize};

/// Progress payload carried by a started job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub current: u32,
    pub total: u32,
    pub step: String,
}

impl Progress {
    pub fn new(current: u32, total: u32, step: impl Into<String>) -> Self {
        Self {
            current,
            total,
            step: step.into(),
        }
    }
}

/// State of a transcription job, as returned to pollers.
///
/// Polling is idempotent: reading a status never changes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, not yet picked up.
    Pending,
    Started {
        progress: Progress,
    },
    Success {
        output: JobOutput,
    },
    /// Failed; the last reported progress stays visible.
    Failure {
        reason: String,
        progress: Option<Progress>,
    },
    /// No job with this id is known.
    Unknown,
}

impl JobStatus {
    /// True once the job can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success { .. } | JobStatus::Failure { .. })
    }

    /// Last reported progress, if any.
    pub fn progress(&self) -> Option<&Progress> {
        match self {
            JobStatus::Started { progress } => Some(progress),
            JobStatus::Failure { progress, .. } => progress.as_ref(),
            _ => None,
        }
    }
}

/// State of one dispatched sub-job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubJobState {
    Pending,
    Started,
    Success,
    Failure,
    Revoked,
}

impl SubJobState {
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            SubJobState::Success | SubJobState::Failure | SubJobState::Revoked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn started_serializes_with_progress() {
        let status = JobStatus::Started {
            progress: Progress::new(2, 5, "Transcription (40.00%)"),
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"state\":\"started\""), "got {json}");
        assert!(json.contains("\"current\":2"));
        assert!(json.contains("\"total\":5"));
    }

    #[test]
    fn failure_keeps_last_progress() {
        let status = JobStatus::Failure {
            reason: "Diarization has failed: boom".to_string(),
            progress: Some(Progress::new(3, 5, "Diarization")),
        };
        assert!(status.is_terminal());
        assert_eq!(status.progress().map(|p| p.current), Some(3));
    }

    #[test]
    fn pending_and_unknown_are_not_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Unknown.is_terminal());
        assert!(JobStatus::Unknown.progress().is_none());
    }

    #[test]
    fn sub_job_states_use_broker_names() {
        let json = serde_json::to_string(&SubJobState::Failure).unwrap();
        assert_eq!(json, "\"FAILURE\"");
        assert!(SubJobState::Revoked.is_finished());
        assert!(!SubJobState::Started.is_finished());
    }
}
