//! Progress estimation
//!
//! Every phase attaches exactly one [`ProgressEstimator`]. The set is closed:
//!
//! - acquisition without a bitrate hint scrapes the tool's log, preferring
//!   segment counting once a `Segment N complete` line has been seen
//! - acquisition with a bitrate hint polls the partial file size
//! - remux reads the structured `key=value` progress stream
//!
//! Estimators report a phase-local percent. [`overall_percent`] maps it onto a
//! single 0-100 scale across both phases.

pub mod byte_size;
pub mod duration;
pub mod key_value;
pub mod line;
pub mod segment;

pub use byte_size::{ByteSizeProgress, predicted_bytes, spawn_byte_size_poller};
pub use duration::{format_duration, parse_duration};
pub use key_value::KeyValueProgress;
pub use line::LineProgressParser;
pub use segment::{SegmentCountProgress, SegmentTuning};

use crate::process::{OutputChunk, OutputStream};
use crate::types::Phase;

/// Share of the overall scale given to the acquisition phase
pub const ACQUISITION_WEIGHT: f64 = 0.85;

/// Map a phase-local percent onto the overall 0-100 scale
///
/// The end of acquisition and the start of remux land on the same value.
pub fn overall_percent(phase: Phase, percent: f64) -> f64 {
    let percent = percent.clamp(0.0, 100.0);
    match phase {
        Phase::Downloading => percent * ACQUISITION_WEIGHT,
        Phase::Processing => {
            ACQUISITION_WEIGHT * 100.0 + percent * (1.0 - ACQUISITION_WEIGHT)
        }
        Phase::Completed => 100.0,
        Phase::Failed => percent,
    }
}

/// Splits a text stream into lines, keeping a trailing partial line for later
///
/// Both `\n` and `\r` end a line: tools redraw status lines with a bare
/// carriage return.
#[derive(Debug, Clone, Default)]
pub struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    /// Append a chunk and return the non-empty lines it completed
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.pending.push_str(chunk);

        let Some(last_break) = self.pending.rfind(['\n', '\r']) else {
            return Vec::new();
        };
        let rest = self.pending.split_off(last_break + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete
            .split(['\n', '\r'])
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Return the trailing partial line, if any, and clear the buffer
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}

/// One [`LineBuffer`] per output stream so partial lines never interleave
#[derive(Debug, Clone, Default)]
pub struct StreamLines {
    stdout: LineBuffer,
    stderr: LineBuffer,
}

impl StreamLines {
    pub fn push(&mut self, stream: OutputStream, chunk: &str) -> Vec<String> {
        match stream {
            OutputStream::Stdout => self.stdout.push(chunk),
            OutputStream::Stderr => self.stderr.push(chunk),
        }
    }

    pub fn flush(&mut self) -> Vec<String> {
        self.stdout
            .flush()
            .into_iter()
            .chain(self.stderr.flush())
            .collect()
    }
}

/// Which signal drives acquisition progress for a job
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquisitionSignal {
    /// Scrape the acquisition tool's log
    Log,
    /// Poll the partial file size against a size predicted from a bitrate
    ByteSize,
}

impl AcquisitionSignal {
    /// A usable bitrate hint selects byte-size polling
    pub fn select(bitrate_hint: Option<f64>) -> Self {
        match bitrate_hint {
            Some(bitrate) if bitrate.is_finite() && bitrate > 0.0 => AcquisitionSignal::ByteSize,
            _ => AcquisitionSignal::Log,
        }
    }
}

/// The progress strategy attached to a running phase
#[derive(Debug, Clone)]
pub enum ProgressEstimator {
    /// Log scraping for acquisition
    Log {
        lines: StreamLines,
        line: LineProgressParser,
        segments: SegmentCountProgress,
        target_seconds: f64,
        percent: f64,
    },
    /// File size polling for acquisition
    ByteSize(ByteSizeProgress),
    /// Structured progress for remux
    KeyValue(KeyValueProgress),
}

impl ProgressEstimator {
    /// Estimator for the acquisition phase
    pub fn for_acquisition(
        target_seconds: f64,
        bitrate_hint: Option<f64>,
        tuning: SegmentTuning,
    ) -> Self {
        match (AcquisitionSignal::select(bitrate_hint), bitrate_hint) {
            (AcquisitionSignal::ByteSize, Some(bitrate)) => ProgressEstimator::ByteSize(
                ByteSizeProgress::new(predicted_bytes(bitrate, target_seconds), target_seconds),
            ),
            _ => ProgressEstimator::Log {
                lines: StreamLines::default(),
                line: LineProgressParser::new(target_seconds),
                segments: SegmentCountProgress::new(target_seconds, tuning),
                target_seconds,
                percent: 0.0,
            },
        }
    }

    /// Estimator for the remux phase
    pub fn for_remux(target_seconds: f64) -> Self {
        ProgressEstimator::KeyValue(KeyValueProgress::new(target_seconds))
    }

    pub fn signal(&self) -> Option<AcquisitionSignal> {
        match self {
            ProgressEstimator::Log { .. } => Some(AcquisitionSignal::Log),
            ProgressEstimator::ByteSize(_) => Some(AcquisitionSignal::ByteSize),
            ProgressEstimator::KeyValue(_) => None,
        }
    }

    /// Feed process output; returns the percent if the chunk moved the estimate
    pub fn observe_output(&mut self, chunk: &OutputChunk) -> Option<f64> {
        match self {
            ProgressEstimator::Log {
                lines,
                line,
                segments,
                percent,
                ..
            } => {
                let complete = lines.push(chunk.stream, &chunk.text);
                Self::observe_log_lines(&complete, line, segments, percent)
            }
            ProgressEstimator::ByteSize(_) => None,
            ProgressEstimator::KeyValue(progress) => progress.push_chunk(chunk.stream, &chunk.text),
        }
    }

    /// Feed a partial-file size sample
    pub fn observe_size(&mut self, bytes: u64) -> Option<f64> {
        match self {
            ProgressEstimator::ByteSize(progress) => Some(progress.observe_size(bytes)),
            _ => None,
        }
    }

    /// Drain buffered partial lines once the process has exited
    pub fn finish(&mut self) -> Option<f64> {
        match self {
            ProgressEstimator::Log {
                lines,
                line,
                segments,
                percent,
                ..
            } => {
                let rest = lines.flush();
                Self::observe_log_lines(&rest, line, segments, percent)
            }
            ProgressEstimator::ByteSize(_) => None,
            ProgressEstimator::KeyValue(progress) => progress.flush(),
        }
    }

    fn observe_log_lines(
        complete: &[String],
        line: &LineProgressParser,
        segments: &mut SegmentCountProgress,
        percent: &mut f64,
    ) -> Option<f64> {
        let mut moved = false;
        for text in complete {
            let segment_update = segments.observe_line(text);
            let candidate = if segments.segment_count() > 0 {
                // Segment counting wins once the tool reports segments
                segment_update
            } else {
                line.parse_line(text)
            };
            if let Some(candidate) = candidate {
                if candidate > *percent {
                    *percent = candidate;
                    moved = true;
                }
            }
        }
        moved.then_some(*percent)
    }

    /// Phase-local percent in `[0, 100]`
    pub fn percent(&self) -> f64 {
        match self {
            ProgressEstimator::Log { percent, .. } => *percent,
            ProgressEstimator::ByteSize(progress) => progress.percent(),
            ProgressEstimator::KeyValue(progress) => progress.percent(),
        }
    }

    /// Seconds of the slice the current phase has covered
    pub fn processed_seconds(&self) -> f64 {
        match self {
            ProgressEstimator::Log {
                segments,
                target_seconds,
                percent,
                ..
            } => {
                if segments.segment_count() > 0 {
                    segments.processed_seconds()
                } else {
                    percent / 100.0 * target_seconds
                }
            }
            ProgressEstimator::ByteSize(progress) => progress.processed_seconds(),
            ProgressEstimator::KeyValue(progress) => progress.processed_seconds(),
        }
    }
}
