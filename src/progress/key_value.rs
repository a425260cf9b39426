//! Structured `key=value` progress from the remux tool
//!
//! With `-progress pipe:1` the remux tool writes blocks such as
//!
//! ```text
//! out_time_us=5000000
//! out_time=00:00:05.000000
//! progress=continue
//! ```
//!
//! to stdout. Older builds only print `time=HH:MM:SS.ff` status lines on
//! stderr, which are used as a fallback.

use regex::Regex;
use std::sync::LazyLock;

use super::StreamLines;
use super::duration::parse_duration;
use crate::process::OutputStream;

#[allow(clippy::expect_used)]
static LEGACY_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\btime=\s*(\S+)").expect("valid legacy time regex"));

/// Remux progress built from `key=value` lines
#[derive(Debug, Clone)]
pub struct KeyValueProgress {
    target_seconds: f64,
    lines: StreamLines,
    processed_seconds: f64,
    finished: bool,
}

impl KeyValueProgress {
    pub fn new(target_seconds: f64) -> Self {
        Self {
            target_seconds,
            lines: StreamLines::default(),
            processed_seconds: 0.0,
            finished: false,
        }
    }

    /// Feed a raw output chunk; partial trailing lines are kept for the next chunk
    ///
    /// Returns the percent after the chunk if any complete line was consumed.
    pub fn push_chunk(&mut self, stream: OutputStream, text: &str) -> Option<f64> {
        let lines = self.lines.push(stream, text);
        if lines.is_empty() {
            return None;
        }
        for line in &lines {
            self.observe_line(line);
        }
        Some(self.percent())
    }

    /// Consume whatever partial lines remain once the process has exited
    pub fn flush(&mut self) -> Option<f64> {
        let lines = self.lines.flush();
        if lines.is_empty() {
            return None;
        }
        for line in &lines {
            self.observe_line(line);
        }
        Some(self.percent())
    }

    /// Apply a single complete line
    pub fn observe_line(&mut self, line: &str) {
        let line = line.trim();
        let Some((key, value)) = line.split_once('=') else {
            return;
        };
        let value = value.trim();

        match key.trim() {
            // Despite its name, out_time_ms carries microseconds
            "out_time_us" | "out_time_ms" => {
                if let Ok(micros) = value.parse::<i64>() {
                    if micros >= 0 {
                        self.advance(micros as f64 / 1_000_000.0);
                    }
                }
            }
            "out_time" => {
                if let Some(seconds) = parse_duration(value) {
                    self.advance(seconds);
                }
            }
            "progress" => {
                if value == "end" {
                    self.finished = true;
                    self.advance(self.target_seconds);
                }
            }
            _ => {
                if let Some(seconds) = LEGACY_TIME
                    .captures_iter(line)
                    .filter_map(|c| parse_duration(&c[1]))
                    .last()
                {
                    self.advance(seconds);
                }
            }
        }
    }

    fn advance(&mut self, seconds: f64) {
        if seconds.is_finite() && seconds > self.processed_seconds {
            self.processed_seconds = seconds;
        }
    }

    /// Percent in `[0, 100]`; exactly 100 once `progress=end` was seen
    pub fn percent(&self) -> f64 {
        if self.finished {
            return 100.0;
        }
        if self.target_seconds <= 0.0 {
            return 0.0;
        }
        (self.processed_seconds / self.target_seconds * 100.0).clamp(0.0, 100.0)
    }

    pub fn processed_seconds(&self) -> f64 {
        self.processed_seconds.min(self.target_seconds.max(0.0))
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
