use crate::defaults;
use crate::error::{JobscribeError, Result};
use crate::job::task::OutputMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub store: StoreConfig,
    pub segmenter: SegmenterConfig,
    /// Out-of-process workers, keyed by the queue they consume.
    pub workers: BTreeMap<String, WorkerConfig>,
}

/// Transcription service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Transcription service name; selects queue and capability.
    pub name: String,
    /// Default language for punctuation.
    pub language: String,
    /// Keep the transcoded working file after each job.
    pub keep_audio: bool,
    /// Where uploaded audio is written before a job runs.
    pub audio_folder: PathBuf,
    /// Return the full result or only its storage key.
    pub output: OutputMode,
}

/// Result store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

/// Chunk splitting configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmenterConfig {
    /// RMS level (0.0 to 1.0) above which a frame counts as speech.
    pub vad_threshold: f32,
    pub frame_ms: u32,
    /// Shortest silence a chunk boundary may be placed in.
    pub min_silence_ms: u32,
    pub min_chunk_secs: f64,
    pub max_chunk_secs: f64,
}

/// One out-of-process worker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct WorkerConfig {
    /// Capability the worker advertises.
    pub capability: String,
    /// Program to run for each sub-job.
    pub command: String,
    pub args: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: defaults::DEFAULT_SERVICE_NAME.to_string(),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            keep_audio: false,
            audio_folder: std::env::temp_dir().join("jobscribe").join("audio"),
            output: OutputMode::Result,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("jobscribe")
                .join("results"),
        }
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            vad_threshold: defaults::VAD_THRESHOLD,
            frame_ms: defaults::FRAME_MS,
            min_silence_ms: defaults::MIN_SILENCE_MS,
            min_chunk_secs: defaults::MIN_CHUNK_SECS,
            max_chunk_secs: defaults::MAX_CHUNK_SECS,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file is missing or contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                JobscribeError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                JobscribeError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(JobscribeError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - JOBSCRIBE_SERVICE_NAME → service.name
    /// - JOBSCRIBE_LANGUAGE → service.language
    /// - JOBSCRIBE_AUDIO_FOLDER → service.audio_folder
    /// - JOBSCRIBE_KEEP_AUDIO → service.keep_audio (true/false, 1/0, yes/no)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(name) = std::env::var("JOBSCRIBE_SERVICE_NAME")
            && !name.is_empty()
        {
            self.service.name = name;
        }

        if let Ok(language) = std::env::var("JOBSCRIBE_LANGUAGE")
            && !language.is_empty()
        {
            self.service.language = language;
        }

        if let Ok(folder) = std::env::var("JOBSCRIBE_AUDIO_FOLDER")
            && !folder.is_empty()
        {
            self.service.audio_folder = PathBuf::from(folder);
        }

        if let Ok(keep) = std::env::var("JOBSCRIBE_KEEP_AUDIO")
            && let Some(keep) = parse_flag(&keep)
        {
            self.service.keep_audio = keep;
        }

        self
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.service.name.trim().is_empty() {
            return Err(invalid("service.name", "must not be empty"));
        }
        if self.service.language.trim().is_empty() {
            return Err(invalid("service.language", "must not be empty"));
        }

        let segmenter = &self.segmenter;
        if !(0.0..=1.0).contains(&segmenter.vad_threshold) {
            return Err(invalid("segmenter.vad_threshold", "must be between 0.0 and 1.0"));
        }
        if segmenter.frame_ms == 0 {
            return Err(invalid("segmenter.frame_ms", "must be positive"));
        }
        if !(segmenter.min_chunk_secs.is_finite() && segmenter.min_chunk_secs > 0.0) {
            return Err(invalid("segmenter.min_chunk_secs", "must be positive"));
        }
        if !(segmenter.max_chunk_secs.is_finite() && segmenter.max_chunk_secs > 0.0) {
            return Err(invalid("segmenter.max_chunk_secs", "must be positive"));
        }
        if segmenter.min_chunk_secs > segmenter.max_chunk_secs {
            return Err(invalid(
                "segmenter.min_chunk_secs",
                "must not exceed segmenter.max_chunk_secs",
            ));
        }

        for (queue, worker) in &self.workers {
            if worker.command.trim().is_empty() {
                return Err(invalid(&format!("workers.{queue}.command"), "must not be empty"));
            }
            if worker.capability.trim().is_empty() {
                return Err(invalid(
                    &format!("workers.{queue}.capability"),
                    "must not be empty",
                ));
            }
        }

        Ok(())
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| JobscribeError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/jobscribe/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("jobscribe")
            .join("config.toml")
    }
}

fn invalid(key: &str, message: &str) -> JobscribeError {
    JobscribeError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
