//! Job intake and polling.
//!
//! [`JobService`] is what a front end talks to: it hashes uploads, answers
//! from the result cache when it can, otherwise stores the audio and runs the
//! job in the background. Callers follow a job by polling its id.

use crate::config::{Config, ServiceConfig};
use crate::dispatch::Dispatcher;
use crate::error::{JobscribeError, Result};
use crate::job::config::TranscriptionConfig;
use crate::job::status::JobStatus;
use crate::job::task::{JobOutput, TaskInfo};
use crate::orchestrator::Orchestrator;
use crate::progress::StatusBoard;
use crate::result::FinalResult;
use crate::segment::WavSegmenter;
use crate::store::{JsonFileStore, ResultStore};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of [`JobService::submit`].
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// The same audio was already transcribed with the same options.
    Cached(FinalResult),
    /// A job was started; poll it with this id.
    Accepted(Uuid),
}

/// Hex SHA-256 of the uploaded bytes.
pub fn content_hash(audio: &[u8]) -> String {
    format!("{:x}", Sha256::digest(audio))
}

/// A job still in flight. The task removes its own entry when it ends.
struct RunningJob {
    /// Taken by the first waiter.
    handle: Option<JoinHandle<Result<JobOutput>>>,
    cancel: CancellationToken,
}

type RunningJobs = Arc<Mutex<HashMap<Uuid, RunningJob>>>;

/// Accepts transcription requests and tracks the jobs they start.
pub struct JobService {
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn ResultStore>,
    board: Arc<StatusBoard>,
    running: RunningJobs,
    settings: ServiceConfig,
}

impl JobService {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        store: Arc<dyn ResultStore>,
        settings: ServiceConfig,
    ) -> Self {
        Self {
            orchestrator,
            store,
            board: Arc::new(StatusBoard::new()),
            running: Arc::new(Mutex::new(HashMap::new())),
            settings,
        }
    }

    /// Wires a service from configuration: WAV segmenter, JSON file store.
    pub fn from_config(config: &Config, dispatcher: Arc<dyn Dispatcher>) -> Self {
        let store: Arc<dyn ResultStore> = Arc::new(JsonFileStore::new(&config.store.path));
        let orchestrator = Orchestrator::new(
            dispatcher,
            Arc::new(WavSegmenter::new(config.segmenter.clone())),
            Arc::clone(&store),
            config.service.language.clone(),
        )
        .with_output(config.service.output);
        Self::new(Arc::new(orchestrator), store, config.service.clone())
    }

    pub fn board(&self) -> &Arc<StatusBoard> {
        &self.board
    }

    /// Accepts an upload.
    ///
    /// Unless `no_cache` is set, a stored result for the same audio and
    /// resolved configuration is returned directly. Otherwise the audio is
    /// written under the audio folder and a job is started.
    pub async fn submit(
        &self,
        audio: &[u8],
        extension: &str,
        config: TranscriptionConfig,
        no_cache: bool,
    ) -> Result<Submission> {
        let hash = content_hash(audio);
        let config = config.resolved();

        if !no_cache {
            match self.store.check_for_result(&hash, &config).await {
                Ok(Some(result)) => {
                    info!(hash = %hash, "returning cached result");
                    return Ok(Submission::Cached(result));
                }
                Ok(None) => {}
                Err(e) => warn!(hash = %hash, error = %e, "cache lookup failed"),
            }
        }

        let job_id = Uuid::new_v4();
        let audio_path = self.write_audio(audio, &hash, job_id, extension).await?;

        let task = TaskInfo {
            transcription_config: config,
            service_name: self.settings.name.clone(),
            content_hash: hash,
            keep_audio: self.settings.keep_audio,
        };
        self.board.mark_pending(job_id);

        let orchestrator = Arc::clone(&self.orchestrator);
        let board = Arc::clone(&self.board);
        let running = Arc::clone(&self.running);
        let sink = board.sink_for(job_id);
        let cancel = CancellationToken::new();
        let job_cancel = cancel.clone();

        // Held until the entry is in, so the task cannot remove it first.
        let mut jobs = lock_running(&self.running);
        let handle = tokio::spawn(async move {
            let mut outcome = orchestrator
                .run_cancellable(&task, &audio_path, sink, job_cancel.clone())
                .await;
            lock_running(&running).remove(&job_id);
            // A revoke that raced the last stage still wins.
            if job_cancel.is_cancelled() {
                outcome = Err(JobscribeError::Cancelled);
            }
            match &outcome {
                Ok(output) => board.mark_success(job_id, output.clone()),
                Err(e) => board.mark_failure(job_id, e.to_string()),
            }
            outcome
        });
        jobs.insert(
            job_id,
            RunningJob {
                handle: Some(handle),
                cancel,
            },
        );
        drop(jobs);

        info!(job_id = %job_id, "job accepted");
        Ok(Submission::Accepted(job_id))
    }

    /// Current status of `job_id`. Never changes it.
    pub fn poll(&self, job_id: Uuid) -> JobStatus {
        self.board.poll(job_id)
    }

    /// Waits for `job_id` to finish and returns its output.
    pub async fn wait(&self, job_id: Uuid) -> Result<JobOutput> {
        let handle = lock_running(&self.running)
            .get_mut(&job_id)
            .and_then(|job| job.handle.take());
        match handle {
            Some(handle) => handle
                .await
                .map_err(|e| JobscribeError::Other(format!("Job {job_id} panicked: {e}")))?,
            None => match self.poll(job_id) {
                JobStatus::Success { output } => Ok(output),
                JobStatus::Failure { reason, .. } => Err(JobscribeError::Other(reason)),
                _ => Err(JobscribeError::Other(format!("Job {job_id} is not running"))),
            },
        }
    }

    /// Cancels a running job. Returns false if it was not running.
    ///
    /// The job revokes its own sub-jobs and removes its chunk files before it
    /// ends; [`JobService::wait`] returns once that is done.
    pub fn revoke(&self, job_id: Uuid) -> bool {
        let jobs = lock_running(&self.running);
        let Some(job) = jobs.get(&job_id) else {
            return false;
        };
        if job.cancel.is_cancelled() {
            return false;
        }
        job.cancel.cancel();
        self.board.mark_failure(job_id, JobscribeError::Cancelled.to_string());
        info!(job_id = %job_id, "job revoked");
        true
    }

    /// Submits and waits, returning the output directly.
    pub async fn transcribe_sync(
        &self,
        audio: &[u8],
        extension: &str,
        config: TranscriptionConfig,
        no_cache: bool,
    ) -> Result<JobOutput> {
        match self.submit(audio, extension, config, no_cache).await? {
            Submission::Cached(result) => Ok(JobOutput::Result(result)),
            Submission::Accepted(job_id) => self.wait(job_id).await,
        }
    }

    async fn write_audio(
        &self,
        audio: &[u8],
        hash: &str,
        job_id: Uuid,
        extension: &str,
    ) -> Result<PathBuf> {
        let folder = &self.settings.audio_folder;
        tokio::fs::create_dir_all(folder).await.map_err(|e| {
            JobscribeError::Other(format!(
                "Failed to create audio folder {}: {e}",
                folder.display()
            ))
        })?;

        let extension = extension.trim_start_matches('.');
        let extension = if extension.is_empty() { "wav" } else { extension };
        let path = folder.join(format!("{hash}-{}.{extension}", job_id.simple()));
        tokio::fs::write(&path, audio).await.map_err(|e| {
            JobscribeError::Other(format!("Failed to write audio {}: {e}", path.display()))
        })?;

        debug!(path = %path.display(), bytes = audio.len(), "audio stored");
        Ok(path)
    }
}

fn lock_running(
    running: &Mutex<HashMap<Uuid, RunningJob>>,
) -> MutexGuard<'_, HashMap<Uuid, RunningJob>> {
    running
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{FnWorker, LocalDispatcher, Worker, WorkerFailure};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::io::Cursor;
    use std::time::Duration;
    use tempfile::TempDir;

    fn wav_bytes(secs: f64) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..(secs * 16000.0) as usize {
            writer.write_sample(8000i16).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    fn stt_worker() -> Arc<dyn Worker> {
        Arc::new(FnWorker::new(|_: &str, _: Value| {
            Ok(json!({
                "text": "hello world",
                "words": [
                    {"word": "hello", "start": 0.1, "end": 0.4, "conf": 0.9},
                    {"word": "world", "start": 0.5, "end": 0.9, "conf": 0.9}
                ],
                "confidence-score": 0.9
            }))
        }))
    }

    struct StuckWorker;

    #[async_trait]
    impl Worker for StuckWorker {
        async fn run(&self, _task: &str, _args: Value) -> std::result::Result<Value, WorkerFailure> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Value::Null)
        }
    }

    fn service(dir: &TempDir, dispatcher: LocalDispatcher) -> (JobService, Arc<MemoryStore>) {
        service_with(dir, Arc::new(dispatcher))
    }

    fn service_with(
        dir: &TempDir,
        dispatcher: Arc<LocalDispatcher>,
    ) -> (JobService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = Orchestrator::new(
            dispatcher,
            Arc::new(WavSegmenter::default()),
            store.clone(),
            "en",
        );
        let settings = ServiceConfig {
            audio_folder: dir.path().join("audio"),
            ..ServiceConfig::default()
        };
        (
            JobService::new(Arc::new(orchestrator), store.clone(), settings),
            store,
        )
    }

    #[test]
    fn content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn accepted_job_runs_to_success() {
        let dir = TempDir::new().unwrap();
        let (service, store) = service(
            &dir,
            LocalDispatcher::new().with_worker("stt_worker", "stt", stt_worker()),
        );

        let submission = service
            .submit(&wav_bytes(2.0), "wav", TranscriptionConfig::default(), false)
            .await
            .unwrap();
        let job_id = match submission {
            Submission::Accepted(job_id) => job_id,
            other => panic!("expected a new job, got {other:?}"),
        };

        let output = service.wait(job_id).await.unwrap();
        let JobOutput::Result(result) = output else {
            panic!("expected a result payload");
        };
        assert_eq!(result.transcription_result, "hello world");
        assert!(matches!(service.poll(job_id), JobStatus::Success { .. }));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn second_submission_is_served_from_cache() {
        let dir = TempDir::new().unwrap();
        let (service, _store) = service(
            &dir,
            LocalDispatcher::new().with_worker("stt_worker", "stt", stt_worker()),
        );
        let audio = wav_bytes(1.0);

        service
            .transcribe_sync(&audio, "wav", TranscriptionConfig::default(), false)
            .await
            .unwrap();
        let again = service
            .submit(&audio, "wav", TranscriptionConfig::default(), false)
            .await
            .unwrap();
        let bypass = service
            .submit(&audio, "wav", TranscriptionConfig::default(), true)
            .await
            .unwrap();

        assert!(matches!(again, Submission::Cached(_)));
        assert!(matches!(bypass, Submission::Accepted(_)));
    }

    #[tokio::test]
    async fn failed_job_reports_reason() {
        let dir = TempDir::new().unwrap();
        let (service, _store) = service(&dir, LocalDispatcher::new());

        let err = service
            .transcribe_sync(&wav_bytes(1.0), "wav", TranscriptionConfig::default(), false)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "No transcription service running for stt");
    }

    #[tokio::test]
    async fn failure_is_visible_to_pollers() {
        let dir = TempDir::new().unwrap();
        let (service, _store) = service(&dir, LocalDispatcher::new());

        let Submission::Accepted(job_id) = service
            .submit(&wav_bytes(1.0), "wav", TranscriptionConfig::default(), false)
            .await
            .unwrap()
        else {
            panic!("expected a new job");
        };
        assert!(service.wait(job_id).await.is_err());

        match service.poll(job_id) {
            JobStatus::Failure { reason, .. } => {
                assert_eq!(reason, "No transcription service running for stt");
            }
            other => panic!("expected failure, got {other:?}"),
        }
        // Polling twice gives the same answer.
        assert_eq!(service.poll(job_id), service.poll(job_id));
    }

    #[tokio::test]
    async fn revoke_stops_a_running_job() {
        let dir = TempDir::new().unwrap();
        let (service, _store) = service(
            &dir,
            LocalDispatcher::new().with_worker("stt_worker", "stt", Arc::new(StuckWorker)),
        );

        let Submission::Accepted(job_id) = service
            .submit(&wav_bytes(1.0), "wav", TranscriptionConfig::default(), false)
            .await
            .unwrap()
        else {
            panic!("expected a new job");
        };

        assert!(service.revoke(job_id));
        assert!(!service.revoke(job_id));
        match service.poll(job_id) {
            JobStatus::Failure { reason, .. } => assert_eq!(reason, "Job was revoked"),
            other => panic!("expected failure, got {other:?}"),
        }
        let err = service.wait(job_id).await.unwrap_err();
        assert!(matches!(err, JobscribeError::Cancelled));
    }

    #[tokio::test]
    async fn revoke_drains_sub_jobs_and_removes_chunks() {
        let dir = TempDir::new().unwrap();
        let dispatcher = Arc::new(
            LocalDispatcher::new().with_worker("stt_worker", "stt", Arc::new(StuckWorker)),
        );
        let (service, store) = service_with(&dir, Arc::clone(&dispatcher));

        // 70 s of speech with no pauses: chunks of 30 s, 30 s and 10 s.
        let Submission::Accepted(job_id) = service
            .submit(&wav_bytes(70.0), "wav", TranscriptionConfig::default(), false)
            .await
            .unwrap()
        else {
            panic!("expected a new job");
        };
        tokio::time::timeout(Duration::from_secs(10), async {
            while dispatcher.submitted_count() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(service.revoke(job_id));
        let err = service.wait(job_id).await.unwrap_err();

        assert!(matches!(err, JobscribeError::Cancelled));
        assert_eq!(dispatcher.revoked_count(), 3);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("audio"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains("_chunk"))
            .collect();
        assert!(leftovers.is_empty(), "chunk files left behind: {leftovers:?}");
        assert_eq!(store.write_count(), 0);
        assert!(lock_running(&service.running).is_empty());
    }

    #[tokio::test]
    async fn finished_jobs_leave_the_running_map() {
        let dir = TempDir::new().unwrap();
        let (service, _store) = service(
            &dir,
            LocalDispatcher::new().with_worker("stt_worker", "stt", stt_worker()),
        );

        let mut ids = Vec::new();
        for secs in [1.0, 2.0, 3.0] {
            match service
                .submit(&wav_bytes(secs), "wav", TranscriptionConfig::default(), true)
                .await
                .unwrap()
            {
                Submission::Accepted(job_id) => ids.push(job_id),
                other => panic!("expected a new job, got {other:?}"),
            }
        }
        // Nobody waits: the jobs are followed by polling only.
        tokio::time::timeout(Duration::from_secs(10), async {
            while !ids
                .iter()
                .all(|id| matches!(service.poll(*id), JobStatus::Success { .. }))
            {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(lock_running(&service.running).is_empty());
        // Output stays available through the status board.
        assert!(service.wait(ids[0]).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_job_polls_unknown() {
        let dir = TempDir::new().unwrap();
        let (service, _store) = service(&dir, LocalDispatcher::new());
        assert_eq!(service.poll(Uuid::new_v4()), JobStatus::Unknown);
    }
}
