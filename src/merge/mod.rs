//! Merging of partial transcriptions into one transcript.
//!
//! Chunk results are rebased onto the whole-audio timeline, then optionally
//! split into speaker turns using diarization segments.

pub mod clean;
pub mod speakers;
pub mod words;

pub use clean::clean_text;
pub use speakers::{SpeakerSegment, SpeakerTurn, attribute_speakers};
pub use words::{MergedTranscript, SubTranscription, Word, merge_transcriptions};
