//! Request-scoped job types: configuration, task description and status.

pub mod config;
pub mod status;
pub mod task;

pub use config::{DiarizationConfig, SubtitleConfig, TranscriptionConfig};
pub use status::{JobStatus, Progress, SubJobState};
pub use task::{JobOutput, OutputMode, TaskInfo};
