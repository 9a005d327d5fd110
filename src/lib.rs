//! jobscribe - Multi-stage transcription job orchestration
//!
//! Splits audio into chunks, fans them out to speech-to-text workers,
//! overlays speaker diarization and punctuation, and persists the result.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod dispatch;
pub mod error;
pub mod job;
pub mod merge;
pub mod orchestrator;
pub mod progress;
pub mod result;
pub mod segment;
pub mod service;
pub mod store;

// Composition root - needs everything
#[cfg(feature = "cli")]
pub mod app;

// Seams (dispatch → segment → store)
pub use dispatch::{CommandWorker, Dispatcher, FnWorker, JobHandle, LocalDispatcher, Worker};
pub use progress::{ProgressSink, StatusBoard};
pub use segment::{Segmenter, WavSegmenter};
pub use store::{JsonFileStore, MemoryStore, ResultStore};

// Pipeline
pub use orchestrator::{Orchestrator, PipelineState};
pub use result::{FinalResult, FinalSegment};
pub use service::{JobService, Submission};

// Request types
pub use job::{JobOutput, JobStatus, OutputMode, Progress, TaskInfo, TranscriptionConfig};

// Error handling
pub use error::{JobscribeError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
