//! Segment-count progress estimation for streamed (fragmented) acquisitions
//!
//! The acquisition log reports `Segment <N> complete` for every fragment. The
//! media duration of a fragment is not printed, so it is estimated from the
//! wall time between completions, seeded with a typical segment length.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tokio::time::Instant;

use crate::config::ProgressConfig;

#[allow(clippy::expect_used)]
static SEGMENT_COMPLETE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bsegment\s+#?(\d+)(?:\s*/\s*\d+)?\s+complete")
        .expect("valid segment regex")
});

/// Extract the segment number from a `Segment <N> complete` line
///
/// Initialization segments carry no media and are ignored.
pub fn parse_segment_number(line: &str) -> Option<u64> {
    if line.to_lowercase().contains("initialization") {
        return None;
    }
    let captures = SEGMENT_COMPLETE.captures(line)?;
    captures[1].parse().ok()
}

/// Tuning knobs for [`SegmentCountProgress`]
#[derive(Debug, Clone, Copy)]
pub struct SegmentTuning {
    /// Seed for the running average segment duration, in seconds
    pub default_segment_seconds: f64,
    /// Weight of each new raw estimate, in (0, 1]
    pub smoothing_factor: f64,
    /// Lower bound of the plausible band as a multiple of the average
    pub plausible_min_ratio: f64,
    /// Upper bound of the plausible band as a multiple of the average
    pub plausible_max_ratio: f64,
    /// Largest per-segment increase in percentage points
    pub max_step: f64,
}

impl Default for SegmentTuning {
    fn default() -> Self {
        Self::from(&ProgressConfig::default())
    }
}

impl From<&ProgressConfig> for SegmentTuning {
    fn from(config: &ProgressConfig) -> Self {
        Self {
            default_segment_seconds: config.default_segment_seconds,
            smoothing_factor: config.smoothing_factor,
            plausible_min_ratio: config.plausible_min_ratio,
            plausible_max_ratio: config.plausible_max_ratio,
            max_step: config.max_step,
        }
    }
}

/// Running estimate of acquired media duration from segment completions
#[derive(Debug, Clone)]
pub struct SegmentCountProgress {
    target_seconds: f64,
    tuning: SegmentTuning,
    seen: HashSet<u64>,
    segment_count: u64,
    /// Samples folded into the average, including the seed
    average_samples: u64,
    average_segment_seconds: f64,
    total_estimated_seconds: f64,
    last_completion: Instant,
    percent: f64,
}

impl SegmentCountProgress {
    /// Start estimating now for a slice of `target_seconds`
    pub fn new(target_seconds: f64, tuning: SegmentTuning) -> Self {
        Self::starting_at(target_seconds, tuning, Instant::now())
    }

    /// Start estimating from an explicit instant
    pub fn starting_at(target_seconds: f64, tuning: SegmentTuning, started: Instant) -> Self {
        Self {
            target_seconds,
            tuning,
            seen: HashSet::new(),
            segment_count: 0,
            average_samples: 1,
            average_segment_seconds: tuning.default_segment_seconds,
            total_estimated_seconds: 0.0,
            last_completion: started,
            percent: 0.0,
        }
    }

    /// Feed one log line observed now
    pub fn observe_line(&mut self, line: &str) -> Option<f64> {
        self.observe_line_at(line, Instant::now())
    }

    /// Feed one log line observed at `now`
    ///
    /// Returns the updated percent when the line reports a segment not seen
    /// before, `None` otherwise (including replays of a known segment).
    pub fn observe_line_at(&mut self, line: &str, now: Instant) -> Option<f64> {
        let number = parse_segment_number(line)?;
        if !self.seen.insert(number) {
            return None;
        }

        let gap = now
            .saturating_duration_since(self.last_completion)
            .as_secs_f64();
        self.last_completion = now;
        self.segment_count += 1;

        let low = self.average_segment_seconds * self.tuning.plausible_min_ratio;
        let high = self.average_segment_seconds * self.tuning.plausible_max_ratio;
        if (low..=high).contains(&gap) {
            self.total_estimated_seconds += gap;
            self.average_samples += 1;
            self.average_segment_seconds +=
                (gap - self.average_segment_seconds) / self.average_samples as f64;
        } else {
            // Outliers count as one average segment so progress neither stalls nor jumps
            self.total_estimated_seconds += self.average_segment_seconds;
        }

        self.percent = self.next_percent();
        Some(self.percent)
    }

    /// Next reported percent, derived from the estimated total
    ///
    /// Every step, including the one that reaches 100, moves by at most
    /// `max_step` points and never backwards.
    fn next_percent(&self) -> f64 {
        let reached =
            self.target_seconds <= 0.0 || self.total_estimated_seconds >= self.target_seconds;
        let goal = if reached {
            // Smoothing would only approach the target asymptotically
            100.0
        } else {
            let raw = self.total_estimated_seconds / self.target_seconds * 100.0;
            self.percent + self.tuning.smoothing_factor * (raw - self.percent)
        };

        goal.min(self.percent + self.tuning.max_step)
            .max(self.percent)
            .min(100.0)
    }

    /// Current percent in `[0, 100]`
    pub fn percent(&self) -> f64 {
        self.percent
    }

    /// Number of distinct segments seen
    pub fn segment_count(&self) -> u64 {
        self.segment_count
    }

    /// Current running average of one segment's duration
    pub fn average_segment_seconds(&self) -> f64 {
        self.average_segment_seconds
    }

    /// Estimated media seconds acquired so far
    pub fn total_estimated_seconds(&self) -> f64 {
        self.total_estimated_seconds
    }

    /// Estimated media seconds acquired, capped at the target
    pub fn processed_seconds(&self) -> f64 {
        self.total_estimated_seconds.min(self.target_seconds)
    }
}
