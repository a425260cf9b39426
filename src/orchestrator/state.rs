//! Forward-only job state machine

use thiserror::Error;

use crate::types::Phase;

/// A move the state machine does not allow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid job transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: Phase,
    pub to: Phase,
}

/// Downloading → Processing → Completed, with Failed reachable from either
/// running phase. Terminal phases have no exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStateMachine {
    phase: Phase,
}

impl Default for JobStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStateMachine {
    pub fn new() -> Self {
        Self {
            phase: Phase::Downloading,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn allows(from: Phase, to: Phase) -> bool {
        matches!(
            (from, to),
            (Phase::Downloading, Phase::Processing)
                | (Phase::Downloading, Phase::Failed)
                | (Phase::Processing, Phase::Completed)
                | (Phase::Processing, Phase::Failed)
        )
    }

    pub fn transition(&mut self, to: Phase) -> Result<Phase, InvalidTransition> {
        if !Self::allows(self.phase, to) {
            return Err(InvalidTransition {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        Ok(to)
    }
}
