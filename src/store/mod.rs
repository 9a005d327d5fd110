//! Persistence of finished results.
//!
//! Results are keyed by the content hash of the uploaded audio together with
//! the fingerprint of the resolved request configuration, so the same audio
//! transcribed with different options is stored separately.

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::job::config::TranscriptionConfig;
use crate::result::FinalResult;
use async_trait::async_trait;

/// Document store for finished results.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Stores `result` and returns the id it can be fetched under.
    async fn write_result(
        &self,
        content_hash: &str,
        config: &TranscriptionConfig,
        result: &FinalResult,
    ) -> Result<String>;

    /// Previously stored result for this audio and configuration, if any.
    async fn check_for_result(
        &self,
        content_hash: &str,
        config: &TranscriptionConfig,
    ) -> Result<Option<FinalResult>>;

    /// Result stored under `result_id`, if any.
    async fn fetch(&self, result_id: &str) -> Result<Option<FinalResult>>;
}

/// Storage key for a result: `{content_hash}_{config fingerprint}`.
pub fn result_key(content_hash: &str, config: &TranscriptionConfig) -> String {
    format!("{content_hash}_{}", config.fingerprint())
}
