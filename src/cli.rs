//! Command-line interface for jobscribe
//!
//! Provides argument parsing using clap derive macros.

use crate::job::config::{DiarizationConfig, SubtitleConfig, TranscriptionConfig};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Multi-stage transcription jobs
#[derive(Parser, Debug)]
#[command(
    name = "jobscribe",
    version,
    about = "Orchestrates transcription, diarization and punctuation workers"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress progress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: info, -vv: debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transcribe an audio file and print the result as JSON
    Transcribe(TranscribeArgs),

    /// Print a stored result by the id a job returned
    Fetch(FetchArgs),

    /// List configured workers and whether each is available
    Capabilities,

    /// Print the effective configuration
    Config,
}

/// Options of the `transcribe` command
#[derive(Args, Debug, Clone, PartialEq)]
pub struct TranscribeArgs {
    /// WAV file to transcribe
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Attribute speech to speakers
    #[arg(long)]
    pub diarization: bool,

    /// Exact number of speakers, when known
    #[arg(long, value_name = "N")]
    pub speakers: Option<u32>,

    /// Upper bound on the number of speakers
    #[arg(long, value_name = "N")]
    pub max_speakers: Option<u32>,

    /// Produce subtitle-ready speaker turns (implies --diarization)
    #[arg(long)]
    pub subtitle: bool,

    /// Restore punctuation
    #[arg(long)]
    pub punctuation: bool,

    /// Punctuation language (default: service language)
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// Keep the transcoded working file
    #[arg(long)]
    pub keep_audio: bool,

    /// Ignore cached results
    #[arg(long)]
    pub no_cache: bool,
}

/// Options of the `fetch` command
#[derive(Args, Debug, Clone, PartialEq)]
pub struct FetchArgs {
    /// Id printed by a job run in result-id output mode
    #[arg(value_name = "RESULT_ID")]
    pub result_id: String,

    /// Print one `speaker: text` line per turn instead of JSON
    #[arg(long)]
    pub lines: bool,
}

impl TranscribeArgs {
    /// Request configuration described by these flags.
    pub fn transcription_config(&self) -> TranscriptionConfig {
        TranscriptionConfig {
            language: self.language.clone(),
            enable_punctuation: self.punctuation,
            diarization_config: DiarizationConfig {
                enable_diarization: self.diarization,
                number_of_speaker: self.speakers,
                max_number_of_speaker: self.max_speakers,
            },
            subtitle_config: SubtitleConfig {
                enable_subtitle: self.subtitle,
            },
        }
    }
}
