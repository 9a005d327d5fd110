//! Speaker attribution: splitting a word stream into speaker turns.

use crate::merge::words::Word;
use serde::{Deserialize, Deserializer, Serialize};

/// A diarization interval on the whole-audio timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerSegment {
    #[serde(rename = "spk_id", deserialize_with = "string_or_number")]
    pub speaker_id: String,
    pub seg_begin: f64,
    pub seg_end: f64,
}

impl SpeakerSegment {
    pub fn new(speaker_id: &str, seg_begin: f64, seg_end: f64) -> Self {
        Self {
            speaker_id: speaker_id.to_string(),
            seg_begin,
            seg_end,
        }
    }
}

/// Consecutive words attributed to one speaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerTurn {
    pub speaker_id: String,
    /// Start of the first word.
    pub start: f64,
    /// End of the last word.
    pub end: f64,
    pub words: Vec<Word>,
}

impl SpeakerTurn {
    /// The turn's words joined with spaces, uncleaned.
    pub fn raw_text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Fold state for [`attribute_speakers`].
///
/// `segment_index` only ever moves forward.
struct Attribution<'a> {
    segments: &'a [SpeakerSegment],
    segment_index: usize,
    pending: Vec<Word>,
    turns: Vec<SpeakerTurn>,
}

impl<'a> Attribution<'a> {
    fn new(segments: &'a [SpeakerSegment]) -> Self {
        Self {
            segments,
            segment_index: 0,
            pending: Vec::new(),
            turns: Vec::new(),
        }
    }

    fn current(&self) -> &SpeakerSegment {
        &self.segments[self.segment_index]
    }

    fn step(mut self, word: Word) -> Self {
        if word.start > self.current().seg_end {
            self.flush();
            // Past the last segment every word stays with the last speaker.
            if self.segment_index + 1 < self.segments.len() {
                self.segment_index += 1;
            }
        }
        self.pending.push(word);
        self
    }

    fn flush(&mut self) {
        let words = std::mem::take(&mut self.pending);
        let (start, end) = match (words.first(), words.last()) {
            (Some(first), Some(last)) => (first.start, last.end),
            _ => return,
        };
        self.turns.push(SpeakerTurn {
            speaker_id: self.current().speaker_id.clone(),
            start,
            end,
            words,
        });
    }

    fn finish(mut self) -> Vec<SpeakerTurn> {
        self.flush();
        self.turns
    }
}

/// Splits `words` into speaker turns using diarization `segments`.
///
/// Words are walked in start order against segments in begin order with a
/// single forward cursor: a word belongs to the current segment unless it
/// starts after that segment's end, which closes the turn and advances the
/// cursor by one. Returns nothing when either input is empty.
pub fn attribute_speakers(words: &[Word], segments: &[SpeakerSegment]) -> Vec<SpeakerTurn> {
    if words.is_empty() || segments.is_empty() {
        return Vec::new();
    }

    let mut words = words.to_vec();
    words.sort_by(|a, b| a.start.total_cmp(&b.start));
    let mut segments = segments.to_vec();
    segments.sort_by(|a, b| a.seg_begin.total_cmp(&b.seg_begin));

    words
        .into_iter()
        .fold(Attribution::new(&segments), Attribution::step)
        .finish()
}

/// Diarizers disagree on whether speaker ids are strings or integers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}
