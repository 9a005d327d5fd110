//! Task description handed to the orchestrator, and what it returns.

use crate::job::config::TranscriptionConfig;
use crate::result::FinalResult;
use serde::{Deserialize, Serialize};

/// Everything the orchestrator needs to know about one accepted request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub transcription_config: TranscriptionConfig,
    /// Transcription service name; selects queue and capability.
    pub service_name: String,
    /// Content hash of the uploaded audio, used as the result key.
    #[serde(rename = "hash")]
    pub content_hash: String,
    /// Keep the transcoded working file after the job.
    pub keep_audio: bool,
}

/// What a finished job hands back, depending on deployment mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Return the full result payload.
    #[default]
    Result,
    /// Return the key under which the result was persisted.
    ResultId,
}

/// Result of a successful job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutput {
    Result(FinalResult),
    ResultId(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_info_uses_hash_key() {
        let task = TaskInfo {
            transcription_config: TranscriptionConfig::default(),
            service_name: "stt".to_string(),
            content_hash: "abc".to_string(),
            keep_audio: false,
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["hash"], "abc");
        assert_eq!(json["service_name"], "stt");

        let back: TaskInfo = serde_json::from_value(json).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn output_mode_parses_snake_case() {
        let mode: OutputMode = serde_json::from_str("\"result_id\"").unwrap();
        assert_eq!(mode, OutputMode::ResultId);
        assert_eq!(OutputMode::default(), OutputMode::Result);
    }
}
