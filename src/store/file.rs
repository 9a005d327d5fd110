//! Result store writing one JSON document per result.

use crate::error::{JobscribeError, Result};
use crate::job::config::TranscriptionConfig;
use crate::result::FinalResult;
use crate::store::{ResultStore, result_key};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Document as written to disk.
#[derive(Debug, Serialize, Deserialize)]
struct StoredResult {
    hash: String,
    config: TranscriptionConfig,
    result: FinalResult,
}

/// Stores results as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    async fn read(&self, key: &str) -> Result<Option<FinalResult>> {
        // Keys are hex digests joined by '_'; anything else cannot name a stored file.
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Ok(None);
        }

        let path = self.path_for(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(JobscribeError::PersistenceFailure {
                    message: format!("failed to read {}: {e}", path.display()),
                });
            }
        };
        let stored: StoredResult =
            serde_json::from_slice(&bytes).map_err(|e| JobscribeError::PersistenceFailure {
                message: format!("corrupt result {}: {e}", path.display()),
            })?;
        Ok(Some(stored.result))
    }
}

#[async_trait]
impl ResultStore for JsonFileStore {
    async fn write_result(
        &self,
        content_hash: &str,
        config: &TranscriptionConfig,
        result: &FinalResult,
    ) -> Result<String> {
        let key = result_key(content_hash, config);
        let document = StoredResult {
            hash: content_hash.to_string(),
            config: config.clone().resolved(),
            result: result.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&document)?;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| JobscribeError::PersistenceFailure {
                message: format!("failed to create {}: {e}", self.dir.display()),
            })?;

        // Write then rename, so readers never see a partial document.
        let path = self.path_for(&key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &bytes)
            .await
            .map_err(|e| JobscribeError::PersistenceFailure {
                message: format!("failed to write {}: {e}", tmp.display()),
            })?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| JobscribeError::PersistenceFailure {
                message: format!("failed to move result into {}: {e}", path.display()),
            })?;

        debug!(key = %key, path = %path.display(), "result stored");
        Ok(key)
    }

    async fn check_for_result(
        &self,
        content_hash: &str,
        config: &TranscriptionConfig,
    ) -> Result<Option<FinalResult>> {
        self.read(&result_key(content_hash, config)).await
    }

    async fn fetch(&self, result_id: &str) -> Result<Option<FinalResult>> {
        self.read(result_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> FinalResult {
        FinalResult {
            transcription_result: "hello world".to_string(),
            raw_transcription: "hello world".to_string(),
            confidence: 0.8,
            segments: Vec::new(),
        }
    }

    #[tokio::test]
    async fn write_then_check_returns_result() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("results"));
        let config = TranscriptionConfig::default();

        let key = store.write_result("abc", &config, &sample()).await.unwrap();

        assert!(dir.path().join("results").join(format!("{key}.json")).exists());
        assert_eq!(
            store.check_for_result("abc", &config).await.unwrap(),
            Some(sample())
        );
        assert_eq!(store.fetch(&key).await.unwrap(), Some(sample()));
    }

    #[tokio::test]
    async fn missing_result_is_none() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());

        let found = store
            .check_for_result("nothing", &TranscriptionConfig::default())
            .await
            .unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn other_config_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        store
            .write_result("abc", &TranscriptionConfig::default(), &sample())
            .await
            .unwrap();

        let punctuated = TranscriptionConfig {
            enable_punctuation: true,
            ..Default::default()
        };
        assert_eq!(store.check_for_result("abc", &punctuated).await.unwrap(), None);
    }

    #[tokio::test]
    async fn path_like_ids_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert_eq!(store.fetch("../etc/passwd").await.unwrap(), None);
        assert_eq!(store.fetch("").await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_document_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        let store = JsonFileStore::new(dir.path());

        let err = store.fetch("bad").await.unwrap_err();
        assert!(matches!(err, JobscribeError::PersistenceFailure { .. }));
    }

    #[tokio::test]
    async fn unwritable_directory_is_a_persistence_failure() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        // A directory cannot be created below a regular file.
        let store = JsonFileStore::new(blocker.join("results"));

        let err = store
            .write_result("abc", &TranscriptionConfig::default(), &sample())
            .await
            .unwrap_err();
        assert!(matches!(err, JobscribeError::PersistenceFailure { .. }));
        assert!(!err.is_fatal());
    }
}
