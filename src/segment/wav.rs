//! WAV segmenter: canonical 16kHz mono transcoding and energy-based chunking.

use crate::config::SegmenterConfig;
use crate::defaults::SAMPLE_RATE;
use crate::error::{JobscribeError, Result};
use crate::segment::{AudioChunk, Segmentation, Segmenter};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const CANONICAL_SPEC: WavSpec = WavSpec {
    channels: 1,
    sample_rate: SAMPLE_RATE,
    bits_per_sample: 16,
    sample_format: SampleFormat::Int,
};

/// Segmenter for WAV input of any rate and channel count.
///
/// Chunks are cut inside a silence once they reach `min_chunk_secs`, and
/// unconditionally at `max_chunk_secs`. They are contiguous and cover the
/// whole file.
#[derive(Debug, Clone, Default)]
pub struct WavSegmenter {
    config: SegmenterConfig,
}

impl WavSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    /// Sample indices at which the audio is cut.
    fn boundaries(&self, samples: &[i16]) -> Vec<usize> {
        let frame_len = (SAMPLE_RATE * self.config.frame_ms.max(1) / 1000).max(1) as usize;
        let min_silence_frames = self.config.min_silence_ms.div_ceil(self.config.frame_ms.max(1));
        let min_chunk = secs_to_samples(self.config.min_chunk_secs);
        let max_chunk = secs_to_samples(self.config.max_chunk_secs).max(frame_len);

        let mut cuts = Vec::new();
        let mut chunk_start = 0;
        let mut silent_frames = 0u32;

        for (i, frame) in samples.chunks(frame_len).enumerate() {
            let frame_end = i * frame_len + frame.len();
            if frame_rms(frame) > self.config.vad_threshold {
                silent_frames = 0;
            } else {
                silent_frames += 1;
            }

            let chunk_len = frame_end - chunk_start;
            let cut = if chunk_len >= max_chunk {
                Some(chunk_start + max_chunk)
            } else if silent_frames >= min_silence_frames.max(1) && chunk_len >= min_chunk {
                // Middle of the silence run.
                Some(frame_end - silent_frames as usize * frame_len / 2)
            } else {
                None
            };

            if let Some(cut) = cut
                && cut > chunk_start
                && cut < samples.len()
            {
                cuts.push(cut);
                chunk_start = cut;
                silent_frames = 0;
            }
        }

        cuts
    }
}

impl Segmenter for WavSegmenter {
    fn transcode(&self, path: &Path) -> Result<PathBuf> {
        let reader = open(path)?;
        let spec = reader.spec();
        if spec == CANONICAL_SPEC && has_wav_extension(path) {
            debug!(path = %path.display(), "audio already canonical");
            return Ok(path.to_path_buf());
        }

        let samples = read_canonical(reader, path)?;
        let canonical = path.with_extension("wav");
        let tmp = path.with_extension("transcoding.wav");
        write_wav(&tmp, &samples)?;
        std::fs::rename(&tmp, &canonical).map_err(|e| JobscribeError::Segmentation {
            message: format!("failed to move {} into place: {e}", tmp.display()),
        })?;
        if canonical != path
            && let Err(e) = std::fs::remove_file(path)
        {
            warn!(path = %path.display(), error = %e, "failed to remove source audio");
        }

        debug!(
            from_rate = spec.sample_rate,
            from_channels = spec.channels,
            path = %canonical.display(),
            "audio transcoded"
        );
        Ok(canonical)
    }

    fn split(&self, canonical: &Path) -> Result<Segmentation> {
        let samples = read_canonical(open(canonical)?, canonical)?;
        if samples.is_empty() {
            return Err(JobscribeError::Segmentation {
                message: format!("{} contains no audio", canonical.display()),
            });
        }
        let total_duration = samples_to_secs(samples.len());

        let cuts = self.boundaries(&samples);
        if cuts.is_empty() {
            return Ok(Segmentation {
                chunks: vec![AudioChunk {
                    path: canonical.to_path_buf(),
                    offset: 0.0,
                    duration: total_duration,
                }],
                total_duration,
            });
        }

        let stem = canonical
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        let starts = std::iter::once(0).chain(cuts.iter().copied());
        let ends = cuts.iter().copied().chain(std::iter::once(samples.len()));

        let mut chunks = Vec::with_capacity(cuts.len() + 1);
        for (index, (start, end)) in starts.zip(ends).enumerate() {
            let path = canonical.with_file_name(format!("{stem}_chunk{index:03}.wav"));
            write_wav(&path, &samples[start..end])?;
            chunks.push(AudioChunk {
                path,
                offset: samples_to_secs(start),
                duration: samples_to_secs(end - start),
            });
        }

        debug!(chunks = chunks.len(), total_duration, "audio split");
        Ok(Segmentation {
            chunks,
            total_duration,
        })
    }
}

fn open(path: &Path) -> Result<WavReader<std::io::BufReader<std::fs::File>>> {
    WavReader::open(path).map_err(|e| JobscribeError::Segmentation {
        message: format!("Failed to parse WAV file {}: {e}", path.display()),
    })
}

/// Reads every sample, down-mixed to mono and resampled to 16kHz.
fn read_canonical<R: std::io::Read>(mut reader: WavReader<R>, path: &Path) -> Result<Vec<i16>> {
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(JobscribeError::Segmentation {
            message: format!("{} declares zero channels", path.display()),
        });
    }

    let read_error = |e: hound::Error| JobscribeError::Segmentation {
        message: format!("Failed to read WAV samples from {}: {e}", path.display()),
    };
    let interleaved: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, bits) if bits <= 16 => reader
            .samples::<i16>()
            .collect::<std::result::Result<_, _>>()
            .map_err(read_error)?,
        (SampleFormat::Int, bits) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| (v >> (bits - 16)) as i16))
            .collect::<std::result::Result<_, _>>()
            .map_err(read_error)?,
        (SampleFormat::Float, _) => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
            .collect::<std::result::Result<_, _>>()
            .map_err(read_error)?,
    };

    let mono = downmix(&interleaved, spec.channels);
    Ok(resample(&mono, spec.sample_rate, SAMPLE_RATE))
}

fn write_wav(path: &Path, samples: &[i16]) -> Result<()> {
    let write_error = |e: hound::Error| JobscribeError::Segmentation {
        message: format!("Failed to write {}: {e}", path.display()),
    };
    let mut writer = WavWriter::create(path, CANONICAL_SPEC).map_err(write_error)?;
    for &sample in samples {
        writer.write_sample(sample).map_err(write_error)?;
    }
    writer.finalize().map_err(write_error)
}

fn has_wav_extension(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "wav")
}

/// Averages interleaved frames into one channel.
fn downmix(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels == 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels as usize)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Simple linear interpolation resampling.
fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(samples.len() - 1);
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}

/// Root-mean-square level of a frame, normalized to 0.0..=1.0.
fn frame_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| {
            let normalized = sample as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();

    (sum_squares / samples.len() as f64).sqrt() as f32
}

fn secs_to_samples(secs: f64) -> usize {
    (secs.max(0.0) * SAMPLE_RATE as f64).round() as usize
}

fn samples_to_secs(samples: usize) -> f64 {
    samples as f64 / SAMPLE_RATE as f64
}
