//! Word-level merge of chunk transcriptions.

use serde::{Deserialize, Serialize};

/// One recognized word. Times are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    #[serde(rename = "word")]
    pub text: String,
    pub start: f64,
    pub end: f64,
    #[serde(rename = "conf", default)]
    pub confidence: f64,
}

impl Word {
    pub fn new(text: &str, start: f64, end: f64, confidence: f64) -> Self {
        Self {
            text: text.to_string(),
            start,
            end,
            confidence,
        }
    }

    /// The same word shifted by `offset` seconds.
    pub fn rebased(&self, offset: f64) -> Self {
        Self {
            text: self.text.clone(),
            start: self.start + offset,
            end: self.end + offset,
            confidence: self.confidence,
        }
    }
}

/// Result of transcribing one chunk, on the chunk's local clock.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubTranscription {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub words: Vec<Word>,
    #[serde(rename = "confidence-score", default)]
    pub confidence: f64,
}

/// Chunk transcriptions joined on the whole-audio timeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MergedTranscript {
    pub text: String,
    pub words: Vec<Word>,
    /// Mean of the per-chunk scores.
    pub confidence: f64,
}

/// Merges `(transcription, offset)` pairs, given in chunk order.
///
/// Word times are shifted by their chunk's offset. Texts are joined with a
/// single space. The confidence is the plain mean of the chunk scores, so every
/// chunk weighs the same regardless of how many words it holds.
pub fn merge_transcriptions(parts: &[(SubTranscription, f64)]) -> MergedTranscript {
    if parts.is_empty() {
        return MergedTranscript::default();
    }

    let text = parts
        .iter()
        .map(|(part, _)| part.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let words = parts
        .iter()
        .flat_map(|(part, offset)| part.words.iter().map(move |w| w.rebased(*offset)))
        .collect();

    let confidence =
        parts.iter().map(|(part, _)| part.confidence).sum::<f64>() / parts.len() as f64;

    MergedTranscript {
        text,
        words,
        confidence,
    }
}
