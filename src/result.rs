//! The composite transcription result.
//!
//! [`TranscriptionResult`] is built from the merged chunk transcriptions and
//! then enriched stage by stage (speaker turns, punctuation). Once every stage
//! has run it is frozen into a [`FinalResult`], the payload that is persisted
//! and returned to callers.

use crate::error::{JobscribeError, Result};
use crate::merge::{
    MergedTranscript, SpeakerSegment, SubTranscription, Word, attribute_speakers, clean_text,
    merge_transcriptions,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One block of the transcript: a speaker turn, or the whole text when
/// diarization did not run.
#[derive(Debug, Clone, PartialEq)]
struct Segment {
    speaker_id: Option<String>,
    start: f64,
    end: f64,
    words: Vec<Word>,
    /// Cleaned text as recognized.
    raw: String,
    /// Text returned by the punctuation stage.
    processed: Option<String>,
}

impl Segment {
    fn text(&self) -> &str {
        self.processed.as_deref().unwrap_or(&self.raw)
    }

    fn line(&self) -> String {
        match &self.speaker_id {
            Some(speaker) => clean_text(&format!("{speaker}: {}", self.text())),
            None => self.text().to_string(),
        }
    }
}

/// Accumulating result of one job.
#[derive(Debug, Clone)]
pub struct TranscriptionResult {
    merged: MergedTranscript,
    segments: Vec<Segment>,
    diarized: bool,
}

impl TranscriptionResult {
    /// Merges `(transcription, offset)` pairs, given in chunk order.
    pub fn new(parts: &[(SubTranscription, f64)]) -> Self {
        Self {
            merged: merge_transcriptions(parts),
            segments: Vec::new(),
            diarized: false,
        }
    }

    /// Splits the transcript into speaker turns.
    ///
    /// When the segments leave nothing to attribute (no words or no segments)
    /// the transcript stays a single block.
    pub fn set_diarization_result(&mut self, segments: &[SpeakerSegment]) {
        let turns = attribute_speakers(&self.merged.words, segments);
        if turns.is_empty() {
            debug!(
                words = self.merged.words.len(),
                segments = segments.len(),
                "nothing to attribute, keeping a single block"
            );
            self.set_no_diarization();
            return;
        }

        self.segments = turns
            .into_iter()
            .map(|turn| Segment {
                raw: clean_text(&turn.raw_text()),
                speaker_id: Some(turn.speaker_id),
                start: turn.start,
                end: turn.end,
                words: turn.words,
                processed: None,
            })
            .collect();
        self.diarized = true;
    }

    /// Keeps the whole transcript as one unattributed block.
    pub fn set_no_diarization(&mut self) {
        let words = self.merged.words.clone();
        let start = words.first().map_or(0.0, |w| w.start);
        let end = words.last().map_or(0.0, |w| w.end);
        self.segments = vec![Segment {
            speaker_id: None,
            start,
            end,
            words,
            raw: clean_text(&self.merged.text),
            processed: None,
        }];
        self.diarized = false;
    }

    pub fn is_diarized(&self) -> bool {
        self.diarized
    }

    /// Cleaned text of each segment, as sent to punctuation.
    pub fn segment_texts(&self) -> Vec<String> {
        self.segments.iter().map(|s| s.raw.clone()).collect()
    }

    /// Replaces each segment's text with its punctuated version.
    ///
    /// `processed` must hold exactly one entry per segment.
    pub fn set_processed_segments(&mut self, processed: Vec<String>) -> Result<()> {
        if processed.len() != self.segments.len() {
            return Err(JobscribeError::PunctuationFailure {
                reason: format!(
                    "expected {} segments, got {}",
                    self.segments.len(),
                    processed.len()
                ),
            });
        }
        for (segment, text) in self.segments.iter_mut().zip(processed) {
            segment.processed = Some(text);
        }
        Ok(())
    }

    /// One line per segment, `"speaker: text"` when diarized.
    pub fn lines(&self) -> Vec<String> {
        self.segments.iter().map(Segment::line).collect()
    }

    /// Freezes the result into its output payload.
    pub fn final_result(&self) -> FinalResult {
        let separator = if self.diarized { "\n" } else { " " };
        FinalResult {
            transcription_result: self.lines().join(separator),
            raw_transcription: clean_text(&self.merged.text),
            confidence: self.merged.confidence,
            segments: self
                .segments
                .iter()
                .map(|s| FinalSegment {
                    spk_id: s.speaker_id.clone(),
                    start: s.start,
                    end: s.end,
                    duration: s.end - s.start,
                    raw_segment: s.raw.clone(),
                    segment: s.text().to_string(),
                    words: s.words.clone(),
                })
                .collect(),
        }
    }
}

/// One segment of a finished result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FinalSegment {
    pub spk_id: Option<String>,
    pub start: f64,
    pub end: f64,
    pub duration: f64,
    pub raw_segment: String,
    pub segment: String,
    pub words: Vec<Word>,
}

/// Result payload returned to callers and written to the result store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FinalResult {
    /// Final text; one `"speaker: text"` line per turn when diarized.
    pub transcription_result: String,
    /// Cleaned text before any enrichment.
    pub raw_transcription: String,
    pub confidence: f64,
    pub segments: Vec<FinalSegment>,
}

impl FinalResult {
    /// `"speaker: text"` lines of the attributed segments.
    pub fn speaker_lines(&self) -> Vec<String> {
        self.segments
            .iter()
            .filter_map(|s| {
                s.spk_id
                    .as_ref()
                    .map(|spk| clean_text(&format!("{spk}: {}", s.segment)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts() -> Vec<(SubTranscription, f64)> {
        vec![
            (
                SubTranscription {
                    text: "hello there".to_string(),
                    words: vec![
                        Word::new("hello", 1.0, 1.4, 0.9),
                        Word::new("there", 2.0, 2.4, 0.9),
                    ],
                    confidence: 0.9,
                },
                0.0,
            ),
            (
                SubTranscription {
                    text: "general <unk> kenobi".to_string(),
                    words: vec![
                        Word::new("general", 0.5, 0.9, 0.7),
                        Word::new("<unk>", 1.0, 1.2, 0.1),
                        Word::new("kenobi", 1.5, 2.0, 0.7),
                    ],
                    confidence: 0.7,
                },
                5.0,
            ),
        ]
    }

    fn speakers() -> Vec<SpeakerSegment> {
        vec![
            SpeakerSegment::new("spk1", 0.0, 5.0),
            SpeakerSegment::new("spk2", 5.0, 10.0),
        ]
    }

    #[test]
    fn undiarized_result_is_one_block() {
        let mut result = TranscriptionResult::new(&parts());
        result.set_no_diarization();

        let out = result.final_result();

        assert_eq!(out.transcription_result, "hello there general kenobi");
        assert_eq!(out.raw_transcription, "hello there general kenobi");
        assert!((out.confidence - 0.8).abs() < 1e-12);
        assert_eq!(out.segments.len(), 1);
        assert_eq!(out.segments[0].spk_id, None);
        assert_eq!(out.segments[0].start, 1.0);
        assert_eq!(out.segments[0].end, 7.0);
        assert_eq!(out.segments[0].words.len(), 5);
        assert!(out.speaker_lines().is_empty());
    }

    #[test]
    fn diarized_result_has_one_line_per_turn() {
        let mut result = TranscriptionResult::new(&parts());
        result.set_diarization_result(&speakers());

        let out = result.final_result();

        assert!(result.is_diarized());
        assert_eq!(
            out.transcription_result,
            "spk1: hello there\nspk2: general kenobi"
        );
        assert_eq!(out.segments[1].spk_id.as_deref(), Some("spk2"));
        assert_eq!(out.segments[1].start, 5.5);
        assert_eq!(out.segments[1].duration, 7.0 - 5.5);
        assert_eq!(
            out.speaker_lines(),
            vec!["spk1: hello there", "spk2: general kenobi"]
        );
    }

    #[test]
    fn empty_diarization_keeps_single_block() {
        let mut result = TranscriptionResult::new(&parts());
        result.set_diarization_result(&[]);

        assert!(!result.is_diarized());
        assert_eq!(result.segment_texts(), vec!["hello there general kenobi"]);
    }

    #[test]
    fn punctuation_replaces_segment_text() {
        let mut result = TranscriptionResult::new(&parts());
        result.set_diarization_result(&speakers());

        assert_eq!(
            result.segment_texts(),
            vec!["hello there", "general kenobi"]
        );
        result
            .set_processed_segments(vec![
                "Hello there.".to_string(),
                "General Kenobi!".to_string(),
            ])
            .unwrap();

        let out = result.final_result();
        assert_eq!(
            out.transcription_result,
            "spk1: Hello there.\nspk2: General Kenobi!"
        );
        assert_eq!(out.segments[0].raw_segment, "hello there");
        assert_eq!(out.segments[0].segment, "Hello there.");
        assert_eq!(out.raw_transcription, "hello there general kenobi");
    }

    #[test]
    fn punctuation_length_mismatch_is_an_error() {
        let mut result = TranscriptionResult::new(&parts());
        result.set_no_diarization();

        let err = result
            .set_processed_segments(vec!["a".to_string(), "b".to_string()])
            .unwrap_err();

        assert!(matches!(err, JobscribeError::PunctuationFailure { .. }));
        assert!(err.to_string().contains("expected 1 segments, got 2"));
    }

    #[test]
    fn final_result_serializes_expected_keys() {
        let mut result = TranscriptionResult::new(&parts());
        result.set_diarization_result(&speakers());

        let json = serde_json::to_value(result.final_result()).unwrap();

        assert!(json["transcription_result"].is_string());
        assert!(json["raw_transcription"].is_string());
        assert!(json["confidence"].is_number());
        let segment = &json["segments"][0];
        for key in ["spk_id", "start", "end", "duration", "raw_segment", "segment", "words"] {
            assert!(segment.get(key).is_some(), "missing {key}");
        }
        assert_eq!(segment["words"][0]["word"], "hello");
    }

    #[test]
    fn turn_of_unknown_tokens_has_no_trailing_space() {
        let parts = vec![(
            SubTranscription {
                text: "<unk> <unk> bye".to_string(),
                words: vec![
                    Word::new("<unk>", 0.5, 0.8, 0.1),
                    Word::new("<unk>", 1.0, 1.2, 0.1),
                    Word::new("bye", 6.0, 6.4, 0.9),
                ],
                confidence: 0.5,
            },
            0.0,
        )];
        let mut result = TranscriptionResult::new(&parts);
        result.set_diarization_result(&speakers());

        let out = result.final_result();

        assert_eq!(result.lines(), vec!["spk1:", "spk2: bye"]);
        assert_eq!(out.transcription_result, "spk1:\nspk2: bye");
        assert_eq!(out.segments[0].segment, "");
        assert_eq!(out.speaker_lines(), vec!["spk1:", "spk2: bye"]);
    }

    #[test]
    fn speaker_lines_are_cleaned() {
        let parts = vec![(
            SubTranscription {
                text: "bonjour <unk> l' ami".to_string(),
                words: vec![
                    Word::new("bonjour", 0.0, 0.2, 1.0),
                    Word::new("<unk>", 0.2, 0.4, 1.0),
                    Word::new("l'", 0.4, 0.6, 1.0),
                    Word::new("ami", 0.6, 1.0, 1.0),
                ],
                confidence: 1.0,
            },
            0.0,
        )];
        let mut result = TranscriptionResult::new(&parts);
        result.set_diarization_result(&speakers());

        assert_eq!(result.lines(), vec!["spk1: bonjour l'ami"]);
    }

    #[test]
    fn no_chunks_yields_empty_result() {
        let mut result = TranscriptionResult::new(&[]);
        result.set_no_diarization();

        let out = result.final_result();
        assert_eq!(out.transcription_result, "");
        assert_eq!(out.confidence, 0.0);
    }
}
