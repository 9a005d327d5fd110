//! Job progress: a monotonic step tracker feeding a sink that pollers read.

pub mod board;

pub use board::StatusBoard;

use crate::job::status::Progress;
use std::sync::Arc;

/// Receives progress reports. Fire-and-forget: reporting never fails a job.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: &Progress);
}

/// Sink that drops every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn report(&self, _progress: &Progress) {}
}

/// Tracks `(current_step, total_steps, label)` plus the transcription percentage
/// for one job.
///
/// Neither the step counter nor the percentage ever moves backwards.
pub struct ProgressTracker {
    sink: Arc<dyn ProgressSink>,
    current: u32,
    total: u32,
    percent: f64,
}

impl ProgressTracker {
    pub fn new(sink: Arc<dyn ProgressSink>, total: u32) -> Self {
        Self {
            sink,
            current: 0,
            total,
            percent: 0.0,
        }
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// Cumulative transcription percentage.
    pub fn percent(&self) -> f64 {
        self.percent
    }

    /// Reports `label` at the current step.
    pub fn update(&self, label: &str) {
        self.sink
            .report(&Progress::new(self.current, self.total, label));
    }

    /// Moves to the next step (capped at the total) and reports `label`.
    pub fn advance(&mut self, label: &str) {
        self.current = (self.current + 1).min(self.total);
        self.update(label);
    }

    /// Adds `delta` percent of transcription and reports it at the current step.
    ///
    /// Negative or non-finite deltas are ignored.
    pub fn add_percent(&mut self, delta: f64) {
        if delta.is_finite() && delta > 0.0 {
            self.percent = (self.percent + delta).min(100.0);
        }
        self.update(&transcription_label(self.percent));
    }
}

/// Label shown while transcription chunks are being collected.
pub fn transcription_label(percent: f64) -> String {
    format!("Transcription ({percent:.2}%)")
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Sink that records every report, for assertions.
    #[derive(Default)]
    pub struct RecordingSink {
        reports: Mutex<Vec<Progress>>,
    }

    impl RecordingSink {
        pub fn reports(&self) -> Vec<Progress> {
            self.reports.lock().unwrap().clone()
        }
    }

    impl ProgressSink for RecordingSink {
        fn report(&self, progress: &Progress) {
            self.reports.lock().unwrap().push(progress.clone());
        }
    }
}
