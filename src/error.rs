//! Error types for jobscribe.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobscribeError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Validation gate: nothing has been dispatched yet
    #[error("{message}")]
    CapabilityUnavailable { capability: String, message: String },

    // Pipeline stage failures (hard, fail the whole job)
    #[error("Audio segmentation failed: {message}")]
    Segmentation { message: String },

    #[error("Failed to dispatch {task} to queue {queue}: {message}")]
    Dispatch {
        task: String,
        queue: String,
        message: String,
    },

    #[error("Transcription has failed on chunk {chunk_index}: {reason}")]
    SubJobFailure { chunk_index: usize, reason: String },

    #[error("Diarization has failed: {reason}")]
    DiarizationFailure { reason: String },

    #[error("Punctuation has failed: {reason}")]
    PunctuationFailure { reason: String },

    #[error("Job was revoked")]
    Cancelled,

    // Soft failures, logged by the orchestrator
    #[error("Failed to write result: {message}")]
    PersistenceFailure { message: String },

    #[error("Failed to remove {path}: {message}")]
    CleanupFailure { path: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl JobscribeError {
    /// Whether this error fails a job.
    ///
    /// Persistence and cleanup errors are reported but never end a job.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            JobscribeError::PersistenceFailure { .. } | JobscribeError::CleanupFailure { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, JobscribeError>;
