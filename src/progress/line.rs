//! Heuristic progress scraping for unstructured acquisition logs

use regex::Regex;
use std::sync::LazyLock;

use super::duration::parse_duration;

#[allow(clippy::expect_used)]
static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("valid ANSI regex"));

#[allow(clippy::expect_used)]
static PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3}(?:\.\d+)?)\s*%").expect("valid percent regex"));

#[allow(clippy::expect_used)]
static THROUGHPUT_UNIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\d\s*(?:[kmgt]i?b|b|[kmg]?bits?)/s\b").expect("valid throughput regex")
});

#[allow(clippy::expect_used)]
static TIME_AT_RATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\s*([0-9][0-9:.hmsHMS]*)\s*@").expect("valid time-at-rate regex")
});

#[allow(clippy::expect_used)]
static DURATION_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\d+:\d{2}(?::\d{2})?(?:\.\d+)?|\b(?:\d+(?:\.\d+)?[hms]){1,3}\b")
        .expect("valid duration token regex")
});

#[allow(clippy::expect_used)]
static ETA_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\beta\b[\s:=]*([0-9][0-9:.hms]*)").expect("valid ETA regex")
});

/// Remove ANSI color/cursor escape sequences from a log line
pub fn strip_ansi(line: &str) -> std::borrow::Cow<'_, str> {
    ANSI_ESCAPE.replace_all(line, "")
}

/// Scrapes phase-local percent from free-form tool output, one line at a time
///
/// Strategies, first match wins:
/// 1. an explicit percent on a line that looks like download progress
/// 2. a `(time @ rate)` duration, relative to the target
/// 3. on lines without an ETA, the last clock or unit duration, relative to the target
/// 4. on lines with an ETA, elapsed / (elapsed + eta)
#[derive(Debug, Clone)]
pub struct LineProgressParser {
    target_seconds: f64,
}

impl LineProgressParser {
    /// Create a parser for a slice of `target_seconds`
    pub fn new(target_seconds: f64) -> Self {
        Self { target_seconds }
    }

    /// Percent in `[0, 100]` for this line, or `None` if it carries no progress
    pub fn parse_line(&self, line: &str) -> Option<f64> {
        let line = strip_ansi(line);
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        self.explicit_percent(line)
            .or_else(|| self.time_at_rate(line))
            .or_else(|| self.elapsed_against_target_or_eta(line))
            .map(|percent| percent.clamp(0.0, 100.0))
    }

    fn explicit_percent(&self, line: &str) -> Option<f64> {
        let lower = line.to_lowercase();
        let in_download_context = lower.contains("download")
            || lower.contains("written")
            || lower.contains("eta")
            || THROUGHPUT_UNIT.is_match(line);
        if !in_download_context {
            return None;
        }

        let captures = PERCENT.captures(line)?;
        captures[1].parse::<f64>().ok()
    }

    fn time_at_rate(&self, line: &str) -> Option<f64> {
        let captures = TIME_AT_RATE.captures(line)?;
        let elapsed = parse_duration(&captures[1])?;
        self.relative_to_target(elapsed)
    }

    fn elapsed_against_target_or_eta(&self, line: &str) -> Option<f64> {
        match ETA_TOKEN.captures(line) {
            Some(eta) => {
                let eta_range = eta.get(0)?.range();
                let remaining = parse_duration(&eta[1])?;
                let elapsed = DURATION_TOKEN
                    .find_iter(line)
                    .filter(|m| m.end() <= eta_range.start || m.start() >= eta_range.end)
                    .filter_map(|m| parse_duration(m.as_str()))
                    .last()?;
                let total = elapsed + remaining;
                if total <= 0.0 {
                    return None;
                }
                Some(elapsed / total * 100.0)
            }
            None => {
                let elapsed = DURATION_TOKEN
                    .find_iter(line)
                    .filter_map(|m| parse_duration(m.as_str()))
                    .last()?;
                self.relative_to_target(elapsed)
            }
        }
    }

    fn relative_to_target(&self, seconds: f64) -> Option<f64> {
        if self.target_seconds <= 0.0 {
            return None;
        }
        Some(seconds / self.target_seconds * 100.0)
    }
}
