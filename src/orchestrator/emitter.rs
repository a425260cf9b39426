//! De-duplicated progress emission for one job

use crate::registry::JobHandle;
use crate::types::{JobEvent, Phase, ProgressSnapshot};

/// Publishes progress only when the rounded percent or the phase changes
///
/// Phase entry and phase exit always publish, so observers see every phase
/// start at 0 and end at 100.
pub struct ProgressEmitter {
    handle: JobHandle,
    snapshot: ProgressSnapshot,
    last_emitted: Option<(Phase, u8)>,
}

impl ProgressEmitter {
    pub fn new(handle: JobHandle, total_seconds: f64) -> Self {
        Self {
            handle,
            snapshot: ProgressSnapshot::start_of(Phase::Downloading, total_seconds),
            last_emitted: None,
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot
    }

    /// Reset the baseline for `phase` and publish 0%
    pub fn enter(&mut self, phase: Phase) {
        self.snapshot = ProgressSnapshot::start_of(phase, self.snapshot.total_seconds);
        self.publish(true);
    }

    /// Record an estimate; returns whether an event went out
    pub fn update(&mut self, percent: f64, processed_seconds: f64) -> bool {
        let percent = percent.clamp(0.0, 100.0);
        self.snapshot.percent = self.snapshot.percent.max(percent);
        self.snapshot.processed_seconds = self
            .snapshot
            .processed_seconds
            .max(processed_seconds.min(self.snapshot.total_seconds));
        self.publish(false)
    }

    /// Publish 100% for the current phase
    pub fn exit(&mut self) {
        self.snapshot.percent = 100.0;
        self.snapshot.processed_seconds = self.snapshot.total_seconds;
        self.publish(true);
    }

    fn publish(&mut self, force: bool) -> bool {
        let key = (self.snapshot.phase, self.snapshot.rounded_percent());
        if !force && self.last_emitted == Some(key) {
            return false;
        }
        self.last_emitted = Some(key);
        self.handle
            .emit(&JobEvent::progress(self.handle.id(), &self.snapshot))
    }
}
