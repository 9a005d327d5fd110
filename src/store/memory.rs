//! In-memory result store.

use crate::error::{JobscribeError, Result};
use crate::job::config::TranscriptionConfig;
use crate::result::FinalResult;
use crate::store::{ResultStore, result_key};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// Result store kept in process memory. Can be switched into a failing mode
/// to simulate a storage outage.
#[derive(Default)]
pub struct MemoryStore {
    results: Mutex<HashMap<String, FinalResult>>,
    failing: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.results.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(JobscribeError::PersistenceFailure {
                message: "result store unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn write_result(
        &self,
        content_hash: &str,
        config: &TranscriptionConfig,
        result: &FinalResult,
    ) -> Result<String> {
        self.check_available()?;
        let key = result_key(content_hash, config);
        self.results.lock().await.insert(key.clone(), result.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(key)
    }

    async fn check_for_result(
        &self,
        content_hash: &str,
        config: &TranscriptionConfig,
    ) -> Result<Option<FinalResult>> {
        self.fetch(&result_key(content_hash, config)).await
    }

    async fn fetch(&self, result_id: &str) -> Result<Option<FinalResult>> {
        self.check_available()?;
        Ok(self.results.lock().await.get(result_id).cloned())
    }
}
