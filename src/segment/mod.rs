//! Audio segmentation: transcoding to the canonical working format and
//! splitting into chunks that can be transcribed independently.

pub mod wav;

pub use wav::WavSegmenter;

use crate::error::Result;
use std::path::{Path, PathBuf};

/// One slice of the working file.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub path: PathBuf,
    /// Start of the slice in the whole audio, in seconds.
    pub offset: f64,
    /// Length of the slice, in seconds.
    pub duration: f64,
}

/// Output of [`Segmenter::split`]: at least one chunk, in time order.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub chunks: Vec<AudioChunk>,
    /// Length of the whole audio, in seconds.
    pub total_duration: f64,
}

impl Segmentation {
    /// True when the only chunk is the working file itself.
    ///
    /// Such a chunk must not be deleted when it is collected.
    pub fn shares_parent(&self) -> bool {
        self.chunks.len() == 1
    }
}

/// Turns an uploaded file into chunks for transcription.
///
/// Both operations are blocking; async callers run them on a blocking thread.
pub trait Segmenter: Send + Sync {
    /// Converts `path` to the canonical format and returns the working file.
    fn transcode(&self, path: &Path) -> Result<PathBuf>;

    /// Splits the working file into chunks with their offsets and durations.
    fn split(&self, canonical: &Path) -> Result<Segmentation>;
}
