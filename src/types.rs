//! Core types for slice-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Opaque unique identifier for a job
///
/// Generated from 128 random bits and rendered as 32 lowercase hex characters.
/// Temp files are named after it, so it must stay filesystem-safe.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh random job identifier
    pub fn generate() -> Self {
        Self(format!("{:032x}", rand::random::<u128>()))
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = crate::error::Error;

    /// Parse an identifier received from a client.
    ///
    /// Only ASCII alphanumerics, `-` and `_` are accepted so that an id can never
    /// escape the temp directory when used in a file name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = !s.is_empty()
            && s.len() <= 64
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(crate::error::Error::NotFound(format!("job {}", s)))
        }
    }
}

/// Job phase
///
/// Phases only move forward: downloading, then processing, then one of the
/// terminal phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Acquiring the requested slice from the remote source
    Downloading,
    /// Remuxing the acquired slice to normalize timestamps
    Processing,
    /// Output file is ready for retrieval
    Completed,
    /// Job failed; no output will be produced
    Failed,
}

impl Phase {
    /// Whether no further transitions are possible
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }

    /// Position in the forward-only ordering of phases
    pub fn rank(self) -> u8 {
        match self {
            Phase::Downloading => 0,
            Phase::Processing => 1,
            Phase::Completed | Phase::Failed => 2,
        }
    }

    /// Lowercase name as used on the wire
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Downloading => "downloading",
            Phase::Processing => "processing",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time progress of one phase
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    /// Phase the snapshot belongs to
    pub phase: Phase,
    /// Seconds of the slice processed so far in this phase
    pub processed_seconds: f64,
    /// Target duration of the slice in seconds
    pub total_seconds: f64,
    /// Phase-local completion (0.0 to 100.0)
    pub percent: f64,
}

impl ProgressSnapshot {
    /// Snapshot at the very start of a phase
    pub fn start_of(phase: Phase, total_seconds: f64) -> Self {
        Self {
            phase,
            processed_seconds: 0.0,
            total_seconds,
            percent: 0.0,
        }
    }

    /// Percent rounded to the integer value that gets emitted
    pub fn rounded_percent(&self) -> u8 {
        self.percent.clamp(0.0, 100.0).round() as u8
    }
}

/// Event published to every observer of a job
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JobEvent {
    /// Progress update within the current phase
    #[serde(rename_all = "camelCase")]
    Progress {
        /// Job ID
        job_id: JobId,
        /// Phase-local progress (0 to 100)
        progress: u8,
        /// Seconds of the slice processed so far
        processed_seconds: f64,
        /// Target duration of the slice in seconds
        total_seconds: f64,
        /// Current phase
        phase: Phase,
    },

    /// Output file is ready
    #[serde(rename_all = "camelCase")]
    Complete {
        /// Job ID
        job_id: JobId,
        /// Suggested file name for the download
        filename: String,
    },

    /// Job failed
    #[serde(rename_all = "camelCase")]
    Error {
        /// Job ID
        job_id: JobId,
        /// User-facing error message
        message: String,
    },
}

impl JobEvent {
    /// Build a progress event from a snapshot
    pub fn progress(job_id: &JobId, snapshot: &ProgressSnapshot) -> Self {
        JobEvent::Progress {
            job_id: job_id.clone(),
            progress: snapshot.rounded_percent(),
            processed_seconds: snapshot.processed_seconds,
            total_seconds: snapshot.total_seconds,
            phase: snapshot.phase,
        }
    }

    /// The job this event belongs to
    pub fn job_id(&self) -> &JobId {
        match self {
            JobEvent::Progress { job_id, .. }
            | JobEvent::Complete { job_id, .. }
            | JobEvent::Error { job_id, .. } => job_id,
        }
    }

    /// Whether this event ends the job's event stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Complete { .. } | JobEvent::Error { .. })
    }

    /// Event name used by the duplex channel in place of the `type` field
    pub fn name(&self) -> &'static str {
        match self {
            JobEvent::Progress { .. } => "progress",
            JobEvent::Complete { .. } => "complete",
            JobEvent::Error { .. } => "error",
        }
    }

    /// Payload without the `type` tag, as sent over the duplex channel
    pub fn payload(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(map) = value.as_object_mut() {
            map.remove("type");
        }
        value
    }
}

/// Request to start a job
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    /// Source media URL to acquire the slice from
    pub url: String,
    /// Slice start offset in seconds (>= 0)
    pub start_time: f64,
    /// Slice end offset in seconds (> start_time)
    pub end_time: f64,
    /// Optional file name for the delivered artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Optional estimated source bitrate in bits per second
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate_hint: Option<f64>,
}

impl StartRequest {
    /// Length of the requested slice in seconds
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Response to a start request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    /// Identifier of the newly created job
    pub job_id: JobId,
}

/// Public view of a job record
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    /// Job ID
    pub job_id: JobId,
    /// Current phase
    pub phase: Phase,
    /// Overall progress across both phases (0 to 100)
    pub progress: u8,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// When the job reached a terminal phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Suggested file name of the delivered artifact
    pub filename: String,
    /// Number of observers currently attached
    pub subscribers: usize,
}
