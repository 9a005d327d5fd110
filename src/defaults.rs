//! Default configuration constants and the worker naming contract.
//!
//! Queue, capability and task names are shared with out-of-process workers,
//! so they live in one place.

/// Canonical sample rate of the transcoded working file, in Hz.
pub const SAMPLE_RATE: u32 = 16000;

/// Default RMS threshold (0.0 to 1.0) above which a frame counts as speech.
pub const VAD_THRESHOLD: f32 = 0.02;

/// Default analysis frame length for chunk splitting, in milliseconds.
pub const FRAME_MS: u32 = 30;

/// Minimum run of silence that may host a chunk boundary, in milliseconds.
pub const MIN_SILENCE_MS: u32 = 400;

/// A chunk is not cut on silence before it reaches this length (seconds).
pub const MIN_CHUNK_SECS: f64 = 10.0;

/// A chunk is always cut once it reaches this length (seconds).
pub const MAX_CHUNK_SECS: f64 = 30.0;

/// Default transcription service name.
pub const DEFAULT_SERVICE_NAME: &str = "stt";

/// Default language for punctuation restoration.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Steps every job goes through: segmentation, transcription, persistence, cleanup.
pub const BASE_STEPS: u32 = 4;

/// Task name for one chunk transcription.
pub const TRANSCRIBE_TASK: &str = "transcribe_task";

/// Task name for whole-file diarization.
pub const DIARIZATION_TASK: &str = "diarization_task";

/// Task name for punctuation restoration.
pub const PUNCTUATION_TASK: &str = "punctuation_task";

/// Queue consumed by diarization workers.
pub const DIARIZATION_QUEUE: &str = "diarization";

/// Capability advertised by diarization workers.
pub const DIARIZATION_CAPABILITY: &str = "diarization_worker";

/// Capability advertised by workers serving transcription service `service`.
pub fn transcription_capability(service: &str) -> String {
    format!("{service}_worker")
}

/// Queue (and capability) of the punctuation worker for `language`.
pub fn punctuation_queue(language: &str) -> String {
    format!("punctuation_{language}")
}

/// Total progress steps for a job with the given optional stages.
pub fn total_steps(diarization: bool, punctuation: bool) -> u32 {
    BASE_STEPS + u32::from(diarization) + u32::from(punctuation)
}
