//! Per-request transcription configuration.
//!
//! Deserialized from the camelCase JSON clients send, e.g.
//! `{"enablePunctuation": true, "diarizationConfig": {"enableDiarization": true}}`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Speaker diarization options.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiarizationConfig {
    pub enable_diarization: bool,
    /// Exact number of speakers, when known.
    pub number_of_speaker: Option<u32>,
    /// Upper bound on the number of speakers.
    pub max_number_of_speaker: Option<u32>,
}

/// Subtitle options. Subtitles need speaker turns, so they imply diarization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubtitleConfig {
    pub enable_subtitle: bool,
}

/// Transcription request configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TranscriptionConfig {
    /// Language selector; falls back to the service language when absent.
    pub language: Option<String>,
    pub enable_punctuation: bool,
    pub diarization_config: DiarizationConfig,
    pub subtitle_config: SubtitleConfig,
}

impl TranscriptionConfig {
    /// Returns the configuration with implied flags made explicit.
    ///
    /// Subtitle mode forces diarization on regardless of the caller's flag.
    pub fn resolved(mut self) -> Self {
        if self.subtitle_config.enable_subtitle {
            self.diarization_config.enable_diarization = true;
        }
        self
    }

    /// Whether the diarization stage runs for this request.
    pub fn diarization_enabled(&self) -> bool {
        self.diarization_config.enable_diarization || self.subtitle_config.enable_subtitle
    }

    /// Language used for punctuation, falling back to `default_language`.
    pub fn language_or<'a>(&'a self, default_language: &'a str) -> &'a str {
        self.language
            .as_deref()
            .filter(|l| !l.is_empty())
            .unwrap_or(default_language)
    }

    /// Stable hex digest of the resolved configuration.
    ///
    /// Two requests that resolve to the same configuration share a fingerprint,
    /// so `enableSubtitle` alone and `enableSubtitle` + `enableDiarization` hit
    /// the same cached result.
    pub fn fingerprint(&self) -> String {
        let resolved = self.clone().resolved();
        // Struct fields serialize in declaration order, so the JSON is canonical.
        let canonical = serde_json::to_vec(&resolved).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        format!("{digest:x}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_disable_everything() {
        let config = TranscriptionConfig::default();
        assert!(!config.enable_punctuation);
        assert!(!config.diarization_enabled());
        assert_eq!(config.language, None);
    }

    #[test]
    fn parses_camel_case_json() {
        let json = r#"{
            "language": "fr",
            "enablePunctuation": true,
            "diarizationConfig": {"enableDiarization": true, "numberOfSpeaker": 2},
            "subtitleConfig": {"enableSubtitle": false}
        }"#;
        let config: TranscriptionConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.language.as_deref(), Some("fr"));
        assert!(config.enable_punctuation);
        assert!(config.diarization_config.enable_diarization);
        assert_eq!(config.diarization_config.number_of_speaker, Some(2));
        assert_eq!(config.diarization_config.max_number_of_speaker, None);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: TranscriptionConfig =
            serde_json::from_str(r#"{"enablePunctuation": true}"#).unwrap();
        assert!(config.enable_punctuation);
        assert_eq!(config.diarization_config, DiarizationConfig::default());
    }

    #[test]
    fn subtitle_forces_diarization() {
        let config = TranscriptionConfig {
            subtitle_config: SubtitleConfig {
                enable_subtitle: true,
            },
            ..Default::default()
        };
        assert!(config.diarization_enabled());
        assert!(config.resolved().diarization_config.enable_diarization);
    }

    #[test]
    fn subtitle_only_matches_explicit_diarization_fingerprint() {
        let subtitle_only = TranscriptionConfig {
            subtitle_config: SubtitleConfig {
                enable_subtitle: true,
            },
            ..Default::default()
        };
        let both = TranscriptionConfig {
            subtitle_config: SubtitleConfig {
                enable_subtitle: true,
            },
            diarization_config: DiarizationConfig {
                enable_diarization: true,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(subtitle_only.fingerprint(), both.fingerprint());
    }

    #[test]
    fn fingerprint_differs_per_option() {
        let plain = TranscriptionConfig::default();
        let punctuated = TranscriptionConfig {
            enable_punctuation: true,
            ..Default::default()
        };
        assert_ne!(plain.fingerprint(), punctuated.fingerprint());
        assert_eq!(plain.fingerprint().len(), 64);
    }

    #[test]
    fn language_falls_back_when_missing_or_empty() {
        let mut config = TranscriptionConfig::default();
        assert_eq!(config.language_or("en"), "en");

        config.language = Some(String::new());
        assert_eq!(config.language_or("en"), "en");

        config.language = Some("de".to_string());
        assert_eq!(config.language_or("en"), "de");
    }
}
