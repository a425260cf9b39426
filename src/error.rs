//! Error types for slice-dl
//!
//! This module provides error handling for the library, including:
//! - Job failure kinds (missing tool, process failure, timeout, missing artifact)
//! - Synchronous validation errors for start requests
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes
//! - User-facing messages for terminal error events

use crate::types::{JobId, Phase};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for slice-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for slice-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "temp_dir")
        key: Option<String>,
    },

    /// Bad or missing start parameter; no job is created
    #[error("invalid {field}: {message}")]
    Validation {
        /// Name of the offending request field (e.g., "endTime")
        field: String,
        /// What is wrong with it
        message: String,
    },

    /// Required external binary could not be resolved
    #[error("required tool '{tool}' was not found")]
    ToolMissing {
        /// Tool name (e.g., "ffmpeg")
        tool: String,
    },

    /// External process exited non-zero or could not be spawned
    #[error("{phase} process failed (exit code {exit_code:?})")]
    ProcessFailure {
        /// Phase whose process failed
        phase: Phase,
        /// Exit code, if the process ran at all
        exit_code: Option<i32>,
    },

    /// External process exceeded its wall-clock budget and was killed
    #[error("{phase} process timed out after {after:?}")]
    Timeout {
        /// Phase whose process timed out
        phase: Phase,
        /// The budget that was exceeded
        after: Duration,
    },

    /// Expected artifact is absent even though the process reported success
    #[error("{phase} produced no output at {path}")]
    ArtifactMissing {
        /// Phase that should have produced the artifact
        phase: Phase,
        /// Where the artifact was expected
        path: PathBuf,
    },

    /// Job or resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Artifact requested before the job completed
    #[error("job {id} is not completed (currently {phase})")]
    NotReady {
        /// The job ID
        id: JobId,
        /// The job's current phase
        phase: Phase,
    },

    /// Operation requires a terminal job but the job is still running
    #[error("job {id} is still {phase}")]
    StillRunning {
        /// The job ID
        id: JobId,
        /// The job's current phase
        phase: Phase,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Job state machine refused a phase change
    #[error(transparent)]
    InvalidTransition(#[from] crate::orchestrator::InvalidTransition),
}

impl Error {
    /// Shorthand for a validation error on one request field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Message shown to end users in terminal error events
    ///
    /// Never includes process output; that stays in the server log.
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation { field, message } => format!("Invalid {}: {}", field, message),
            Error::ToolMissing { tool } => {
                format!("The server is missing a required tool ({}).", tool)
            }
            Error::ProcessFailure {
                phase: Phase::Downloading,
                ..
            } => "Could not download the requested segment from the source.".to_string(),
            Error::ProcessFailure { .. } => "Could not process the downloaded segment.".to_string(),
            Error::Timeout {
                phase: Phase::Downloading,
                ..
            } => "Downloading the segment took too long and was stopped.".to_string(),
            Error::Timeout { .. } => "Processing the segment took too long and was stopped.".to_string(),
            Error::ArtifactMissing { .. } => {
                "The segment finished without producing a file.".to_string()
            }
            Error::ShuttingDown => "The server is shutting down.".to_string(),
            _ => "An unexpected error occurred while preparing the segment.".to_string(),
        }
    }
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "validation_error",
///     "message": "invalid endTime: must be greater than startTime",
///     "details": {
///       "field": "endTime"
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - Client error (invalid input or premature retrieval)
            Error::Config { .. } => 400,
            Error::Validation { .. } => 400,
            Error::NotReady { .. } => 400,

            // 404 Not Found
            Error::NotFound(_) => 404,

            // 409 Conflict - job must finish first
            Error::StillRunning { .. } => 409,

            // 500 Internal Server Error - Server-side issues
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::ArtifactMissing { .. } => 500,
            Error::InvalidTransition(_) => 500,

            // 502 Bad Gateway - External process errors
            Error::ProcessFailure { .. } => 502,

            // 503 Service Unavailable
            Error::ToolMissing { .. } => 503,
            Error::ShuttingDown => 503,

            // 504 Gateway Timeout
            Error::Timeout { .. } => 504,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Validation { .. } => "validation_error",
            Error::ToolMissing { .. } => "tool_missing",
            Error::ProcessFailure { .. } => "process_failure",
            Error::Timeout { .. } => "timeout",
            Error::ArtifactMissing { .. } => "artifact_missing",
            Error::NotFound(_) => "not_found",
            Error::NotReady { .. } => "not_ready",
            Error::StillRunning { .. } => "still_running",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::ShuttingDown => "shutting_down",
            Error::InvalidTransition(_) => "invalid_transition",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Validation { field, .. } => Some(serde_json::json!({
                "field": field,
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            Error::NotReady { id, phase } | Error::StillRunning { id, phase } => {
                Some(serde_json::json!({
                    "job_id": id,
                    "phase": phase,
                }))
            }
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    /// Returns (Error, expected_status_code, expected_error_code) for every
    /// match arm in ToHttpStatus.
    fn all_error_variants() -> Vec<(Error, u16, &'static str)> {
        let id: JobId = "abc".parse().unwrap();
        vec![
            (
                Error::Config {
                    message: "bad value".into(),
                    key: Some("temp_dir".into()),
                },
                400,
                "config_error",
            ),
            (
                Error::validation("endTime", "must be greater than startTime"),
                400,
                "validation_error",
            ),
            (
                Error::NotReady {
                    id: id.clone(),
                    phase: Phase::Processing,
                },
                400,
                "not_ready",
            ),
            (Error::NotFound("job abc".into()), 404, "not_found"),
            (
                Error::StillRunning {
                    id,
                    phase: Phase::Downloading,
                },
                409,
                "still_running",
            ),
            (
                Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")),
                500,
                "io_error",
            ),
            (
                Error::ApiServerError("bind failed".into()),
                500,
                "api_server_error",
            ),
            (
                Error::ArtifactMissing {
                    phase: Phase::Processing,
                    path: PathBuf::from("/tmp/x.mp4"),
                },
                500,
                "artifact_missing",
            ),
            (
                Error::ProcessFailure {
                    phase: Phase::Downloading,
                    exit_code: Some(1),
                },
                502,
                "process_failure",
            ),
            (
                Error::ToolMissing {
                    tool: "ffmpeg".into(),
                },
                503,
                "tool_missing",
            ),
            (Error::ShuttingDown, 503, "shutting_down"),
            (
                Error::InvalidTransition(crate::orchestrator::InvalidTransition {
                    from: Phase::Completed,
                    to: Phase::Processing,
                }),
                500,
                "invalid_transition",
            ),
            (
                Error::Timeout {
                    phase: Phase::Processing,
                    after: Duration::from_secs(60),
                },
                504,
                "timeout",
            ),
        ]
    }

    #[test]
    fn every_variant_maps_to_expected_status_and_code() {
        for (error, status, code) in all_error_variants() {
            assert_eq!(error.status_code(), status, "status for {:?}", error);
            assert_eq!(error.error_code(), code, "code for {:?}", error);
        }
    }

    #[test]
    fn validation_error_carries_field_detail() {
        let api: ApiError = Error::validation("url", "must be an http(s) URL").into();

        assert_eq!(api.error.code, "validation_error");
        assert!(api.error.message.contains("must be an http(s) URL"));
        let details = api.error.details.expect("should have details");
        assert_eq!(details["field"], "url");
    }

    #[test]
    fn not_ready_error_carries_job_and_phase() {
        let api: ApiError = Error::NotReady {
            id: "job9".parse().unwrap(),
            phase: Phase::Downloading,
        }
        .into();

        let details = api.error.details.expect("should have details");
        assert_eq!(details["job_id"], "job9");
        assert_eq!(details["phase"], "downloading");
    }

    #[test]
    fn user_messages_never_leak_process_details() {
        let failure = Error::ProcessFailure {
            phase: Phase::Downloading,
            exit_code: Some(137),
        };
        let timeout = Error::Timeout {
            phase: Phase::Processing,
            after: Duration::from_secs(60),
        };

        assert!(!failure.user_message().contains("137"));
        assert!(failure.user_message().contains("download"));
        assert!(timeout.user_message().contains("too long"));
        assert_eq!(
            Error::Io(std::io::Error::other("disk on fire")).user_message(),
            "An unexpected error occurred while preparing the segment."
        );
    }

    #[test]
    fn api_error_constructors_set_codes() {
        assert_eq!(ApiError::not_found("job x").error.message, "job x not found");
        assert_eq!(ApiError::validation("bad").error.code, "validation_error");
        assert_eq!(ApiError::internal("oops").error.code, "internal_error");
        assert_eq!(ApiError::unauthorized("no").error.code, "unauthorized");
    }
}
