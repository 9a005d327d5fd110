//! The transcription job pipeline.
//!
//! One call to [`Orchestrator::run_transcription_job`] drives one request
//! through
//! `Validating → Segmenting → Transcribing (+ diarization in flight) → Merging
//! → Diarizing → Punctuating → Persisting → Cleanup → Done`,
//! skipping the optional stages the request did not ask for. Any hard failure
//! ends the job in `Failed`; the last progress report stays visible to pollers.

use crate::defaults::{
    DIARIZATION_CAPABILITY, DIARIZATION_QUEUE, DIARIZATION_TASK, PUNCTUATION_TASK,
    TRANSCRIBE_TASK, punctuation_queue, total_steps, transcription_capability,
};
use crate::dispatch::{Dispatcher, JobHandle, WorkerFailure};
use crate::error::{JobscribeError, Result};
use crate::job::config::TranscriptionConfig;
use crate::job::task::{JobOutput, OutputMode, TaskInfo};
use crate::merge::{SpeakerSegment, SubTranscription};
use crate::progress::{ProgressSink, ProgressTracker, transcription_label};
use crate::result::{FinalResult, TranscriptionResult};
use crate::segment::{AudioChunk, Segmentation, Segmenter};
use crate::store::ResultStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pipeline states, in the only order they can be entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    Validating,
    Segmenting,
    Transcribing,
    Merging,
    Diarizing,
    Punctuating,
    Persisting,
    Cleanup,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Validating => "VALIDATING",
            PipelineState::Segmenting => "SEGMENTING",
            PipelineState::Transcribing => "TRANSCRIBING",
            PipelineState::Merging => "MERGING",
            PipelineState::Diarizing => "DIARIZING",
            PipelineState::Punctuating => "PUNCTUATING",
            PipelineState::Persisting => "PERSISTING",
            PipelineState::Cleanup => "CLEANUP",
            PipelineState::Done => "DONE",
            PipelineState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Current state of one job, logged on every transition.
struct StateLog<'a> {
    job: &'a str,
    state: PipelineState,
}

impl<'a> StateLog<'a> {
    fn new(job: &'a str) -> Self {
        info!(job, state = %PipelineState::Validating, "job started");
        Self {
            job,
            state: PipelineState::Validating,
        }
    }

    fn enter(&mut self, next: PipelineState) {
        debug_assert!(next > self.state, "{} -> {next} goes backwards", self.state);
        info!(job = self.job, from = %self.state, to = %next, "pipeline state");
        self.state = next;
    }

    fn fail(&mut self, err: &JobscribeError) {
        error!(job = self.job, state = %self.state, error = %err, "job failed");
        self.state = PipelineState::Failed;
    }
}

/// A dispatched transcription sub-job and the slice it works on.
struct SubJob {
    handle: JobHandle,
    chunk: AudioChunk,
}

#[derive(Serialize)]
struct TranscribeArgs<'a> {
    audio_path: &'a str,
    with_metadata: bool,
}

#[derive(Serialize)]
struct DiarizationArgs<'a> {
    audio_path: &'a str,
    number_of_speaker: Option<u32>,
    max_number_of_speaker: Option<u32>,
}

#[derive(Serialize)]
struct PunctuationArgs {
    segments: Vec<String>,
}

#[derive(Deserialize)]
struct DiarizationOutput {
    segments: Vec<SpeakerSegment>,
}

/// Runs transcription jobs against a dispatcher, a segmenter and a result store.
pub struct Orchestrator {
    dispatcher: Arc<dyn Dispatcher>,
    segmenter: Arc<dyn Segmenter>,
    store: Arc<dyn ResultStore>,
    language: String,
    output: OutputMode,
}

impl Orchestrator {
    /// `language` is the punctuation language used when a request names none.
    pub fn new(
        dispatcher: Arc<dyn Dispatcher>,
        segmenter: Arc<dyn Segmenter>,
        store: Arc<dyn ResultStore>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            dispatcher,
            segmenter,
            store,
            language: language.into(),
            output: OutputMode::Result,
        }
    }

    /// Selects what a successful job returns.
    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    /// Runs one job to completion.
    ///
    /// Returns the final payload, or its storage key in
    /// [`OutputMode::ResultId`] mode when it was persisted.
    pub async fn run_transcription_job(
        &self,
        task: &TaskInfo,
        audio_path: &Path,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<JobOutput> {
        self.run_cancellable(task, audio_path, progress, CancellationToken::new())
            .await
    }

    /// Like [`Orchestrator::run_transcription_job`], stopping once `cancel`
    /// fires.
    ///
    /// A cancelled job revokes every sub-job still in flight, removes the
    /// chunk files and fails with [`JobscribeError::Cancelled`].
    pub async fn run_cancellable(
        &self,
        task: &TaskInfo,
        audio_path: &Path,
        progress: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<JobOutput> {
        let config = task.transcription_config.clone().resolved();
        let mut tracker = ProgressTracker::new(
            progress,
            total_steps(config.diarization_enabled(), config.enable_punctuation),
        );
        let mut states = StateLog::new(&task.content_hash);
        tracker.update("Started");

        let outcome = self
            .run(task, &config, audio_path, &mut tracker, &mut states, &cancel)
            .await;
        match &outcome {
            Ok(_) => states.enter(PipelineState::Done),
            Err(e) => states.fail(e),
        }
        outcome
    }

    async fn run(
        &self,
        task: &TaskInfo,
        config: &TranscriptionConfig,
        audio_path: &Path,
        tracker: &mut ProgressTracker,
        states: &mut StateLog<'_>,
        cancel: &CancellationToken,
    ) -> Result<JobOutput> {
        let language = config.language_or(&self.language).to_string();
        self.validate(&task.service_name, config, &language).await?;

        states.enter(PipelineState::Segmenting);
        tracker.advance("Segmentation");
        let (canonical, segmentation) = self.segment(audio_path).await?;
        info!(
            job = %task.content_hash,
            chunks = segmentation.chunks.len(),
            duration = segmentation.total_duration,
            "audio segmented"
        );
        if cancel.is_cancelled() {
            if !segmentation.shares_parent() {
                for chunk in &segmentation.chunks {
                    remove_file_logged(&chunk.path).await;
                }
            }
            return Err(JobscribeError::Cancelled);
        }

        states.enter(PipelineState::Transcribing);
        tracker.advance(&transcription_label(0.0));
        let sub_jobs = self
            .dispatch_transcriptions(&task.service_name, &segmentation)
            .await?;
        let diarization = if config.diarization_enabled() {
            match self.dispatch_diarization(&canonical, config).await {
                Ok(handle) => Some(handle),
                Err(e) => {
                    self.abandon(sub_jobs, segmentation.shares_parent()).await;
                    return Err(e);
                }
            }
        } else {
            None
        };

        let parts = match self.collect(sub_jobs, &segmentation, tracker, cancel).await {
            Ok(parts) => parts,
            Err(e) => {
                if let Some(handle) = &diarization {
                    self.dispatcher.revoke(handle).await;
                }
                return Err(e);
            }
        };

        states.enter(PipelineState::Merging);
        tracker.update("Merging");
        let mut result = TranscriptionResult::new(&parts);

        match diarization {
            Some(handle) => {
                states.enter(PipelineState::Diarizing);
                tracker.advance("Diarization");
                let segments = self.collect_diarization(&handle, cancel).await?;
                result.set_diarization_result(&segments);
            }
            None => result.set_no_diarization(),
        }

        if config.enable_punctuation {
            states.enter(PipelineState::Punctuating);
            tracker.advance("Punctuation");
            let punctuated = self
                .punctuate(&language, result.segment_texts(), cancel)
                .await?;
            result.set_processed_segments(punctuated)?;
        }

        states.enter(PipelineState::Persisting);
        tracker.advance("Persisting");
        let final_result = result.final_result();
        let result_id = self.persist(task, config, &final_result).await;

        states.enter(PipelineState::Cleanup);
        tracker.advance("Cleaning");
        if !task.keep_audio {
            remove_file_logged(&canonical).await;
        }

        Ok(match (self.output, result_id) {
            (OutputMode::ResultId, Some(id)) => JobOutput::ResultId(id),
            _ => JobOutput::Result(final_result),
        })
    }

    /// Checks that every capability the request needs has a live worker.
    async fn validate(
        &self,
        service_name: &str,
        config: &TranscriptionConfig,
        language: &str,
    ) -> Result<()> {
        let active = self.dispatcher.active_capabilities().await?;
        debug!(?active, "active capabilities");

        let transcription = transcription_capability(service_name);
        if !active.contains(&transcription) {
            return Err(JobscribeError::CapabilityUnavailable {
                message: format!("No transcription service running for {service_name}"),
                capability: transcription,
            });
        }

        if config.diarization_enabled() && !active.contains(DIARIZATION_CAPABILITY) {
            return Err(JobscribeError::CapabilityUnavailable {
                capability: DIARIZATION_CAPABILITY.to_string(),
                message: "Request required diarization but no diarization service is running."
                    .to_string(),
            });
        }

        let punctuation = punctuation_queue(language);
        if config.enable_punctuation && !active.contains(&punctuation) {
            return Err(JobscribeError::CapabilityUnavailable {
                message: format!(
                    "Request required punctuation but no punctuation service is running for {language}."
                ),
                capability: punctuation,
            });
        }

        Ok(())
    }

    async fn segment(&self, audio_path: &Path) -> Result<(PathBuf, Segmentation)> {
        let segmenter = Arc::clone(&self.segmenter);
        let path = audio_path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let canonical = segmenter.transcode(&path)?;
            let segmentation = segmenter.split(&canonical)?;
            Ok((canonical, segmentation))
        })
        .await
        .map_err(|e| JobscribeError::Segmentation {
            message: format!("segmentation task did not complete: {e}"),
        })?
    }

    async fn dispatch_transcriptions(
        &self,
        queue: &str,
        segmentation: &Segmentation,
    ) -> Result<Vec<SubJob>> {
        let mut sub_jobs = Vec::with_capacity(segmentation.chunks.len());
        for chunk in &segmentation.chunks {
            let path = chunk.path.to_string_lossy();
            let args = serde_json::to_value(TranscribeArgs {
                audio_path: &path,
                with_metadata: true,
            })?;
            match self.dispatcher.submit(TRANSCRIBE_TASK, queue, args).await {
                Ok(handle) => sub_jobs.push(SubJob {
                    handle,
                    chunk: chunk.clone(),
                }),
                Err(e) => {
                    let dispatched = sub_jobs.len();
                    self.abandon(sub_jobs, segmentation.shares_parent()).await;
                    // Chunks that were never dispatched are not owned by any sub-job.
                    if !segmentation.shares_parent() {
                        for chunk in &segmentation.chunks[dispatched..] {
                            remove_file_logged(&chunk.path).await;
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(sub_jobs)
    }

    async fn dispatch_diarization(
        &self,
        canonical: &Path,
        config: &TranscriptionConfig,
    ) -> Result<JobHandle> {
        let path = canonical.to_string_lossy();
        let args = serde_json::to_value(DiarizationArgs {
            audio_path: &path,
            number_of_speaker: config.diarization_config.number_of_speaker,
            max_number_of_speaker: config.diarization_config.max_number_of_speaker,
        })?;
        self.dispatcher
            .submit(DIARIZATION_TASK, DIARIZATION_QUEUE, args)
            .await
            .map_err(|e| JobscribeError::DiarizationFailure {
                reason: e.to_string(),
            })
    }

    /// Collects chunk results in dispatch order.
    ///
    /// After the first failure, or once `cancel` fires, the remaining
    /// sub-jobs are revoked instead of awaited, but every one is still
    /// visited so its chunk file is removed.
    async fn collect(
        &self,
        sub_jobs: Vec<SubJob>,
        segmentation: &Segmentation,
        tracker: &mut ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<Vec<(SubTranscription, f64)>> {
        let shares_parent = segmentation.shares_parent();
        let mut parts = Vec::with_capacity(sub_jobs.len());
        let mut failure = None;

        for (index, sub_job) in sub_jobs.into_iter().enumerate() {
            if failure.is_some() {
                self.dispatcher.revoke(&sub_job.handle).await;
                if !shares_parent {
                    remove_file_logged(&sub_job.chunk.path).await;
                }
                continue;
            }

            let outcome = match self.wait_or_revoke(&sub_job.handle, cancel).await {
                Ok(outcome) => outcome,
                Err(cancelled) => {
                    if !shares_parent {
                        remove_file_logged(&sub_job.chunk.path).await;
                    }
                    info!(chunk = index, "job revoked, draining");
                    failure = Some(cancelled);
                    continue;
                }
            };
            let outcome = outcome.and_then(|value| {
                serde_json::from_value::<SubTranscription>(value)
                    .map_err(|e| WorkerFailure::new(format!("invalid transcription result: {e}")))
            });
            if !shares_parent {
                remove_file_logged(&sub_job.chunk.path).await;
            }

            match outcome {
                Ok(part) => {
                    debug!(chunk = index, offset = sub_job.chunk.offset, "chunk transcribed");
                    parts.push((part, sub_job.chunk.offset));
                    tracker.add_percent(sub_job.chunk.duration / segmentation.total_duration * 100.0);
                }
                Err(e) => {
                    warn!(chunk = index, reason = %e.reason, "chunk transcription failed, draining");
                    failure = Some(JobscribeError::SubJobFailure {
                        chunk_index: index,
                        reason: e.reason,
                    });
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(parts),
        }
    }

    async fn collect_diarization(
        &self,
        handle: &JobHandle,
        cancel: &CancellationToken,
    ) -> Result<Vec<SpeakerSegment>> {
        let value = self
            .wait_or_revoke(handle, cancel)
            .await?
            .map_err(|e| JobscribeError::DiarizationFailure { reason: e.reason })?;
        let output: DiarizationOutput =
            serde_json::from_value(value).map_err(|e| JobscribeError::DiarizationFailure {
                reason: format!("invalid diarization result: {e}"),
            })?;
        Ok(output.segments)
    }

    async fn punctuate(
        &self,
        language: &str,
        segments: Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let args = serde_json::to_value(PunctuationArgs { segments })?;
        let handle = self
            .dispatcher
            .submit(PUNCTUATION_TASK, &punctuation_queue(language), args)
            .await
            .map_err(|e| JobscribeError::PunctuationFailure {
                reason: e.to_string(),
            })?;
        let value = self
            .wait_or_revoke(&handle, cancel)
            .await?
            .map_err(|e| JobscribeError::PunctuationFailure { reason: e.reason })?;
        serde_json::from_value(value).map_err(|e| JobscribeError::PunctuationFailure {
            reason: format!("invalid punctuation result: {e}"),
        })
    }

    /// Waits for a sub-job unless `cancel` fires first, in which case the
    /// sub-job is revoked and the job fails with [`JobscribeError::Cancelled`].
    async fn wait_or_revoke(
        &self,
        handle: &JobHandle,
        cancel: &CancellationToken,
    ) -> Result<std::result::Result<Value, WorkerFailure>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.dispatcher.revoke(handle).await;
                Err(JobscribeError::Cancelled)
            }
            outcome = self.dispatcher.wait(handle) => Ok(outcome),
        }
    }

    /// Writes the result; a failure is logged and yields no id.
    async fn persist(
        &self,
        task: &TaskInfo,
        config: &TranscriptionConfig,
        result: &FinalResult,
    ) -> Option<String> {
        match self
            .store
            .write_result(&task.content_hash, config, result)
            .await
        {
            Ok(id) => {
                debug!(job = %task.content_hash, result_id = %id, "result persisted");
                Some(id)
            }
            Err(e) => {
                warn!(job = %task.content_hash, error = %e, "failed to write result, returning it anyway");
                None
            }
        }
    }

    /// Revokes dispatched sub-jobs and removes their chunk files.
    async fn abandon(&self, sub_jobs: Vec<SubJob>, shares_parent: bool) {
        for sub_job in sub_jobs {
            self.dispatcher.revoke(&sub_job.handle).await;
            if !shares_parent {
                remove_file_logged(&sub_job.chunk.path).await;
            }
        }
    }
}

async fn remove_file_logged(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        let err = JobscribeError::CleanupFailure {
            path: path.display().to_string(),
            message: e.to_string(),
        };
        warn!(error = %err, "cleanup failed");
    }
}
