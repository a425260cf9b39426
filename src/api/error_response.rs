//! HTTP error response handling for the API
//!
//! Conversions from domain errors to HTTP responses with JSON error bodies.

use crate::error::{ApiError, Error, ToHttpStatus};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            tracing::warn!(error = %self, status = status_code.as_u16(), "request failed");
        }

        let api_error: ApiError = self.into();
        (status_code, Json(api_error)).into_response()
    }
}

/// Bare `ApiError`s carry no status of their own and map to 500
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobId, Phase};

    async fn body_of(response: Response) -> ApiError {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn validation_error_into_response() {
        let response = Error::validation("endTime", "must be greater than startTime").into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let api_error = body_of(response).await;
        assert_eq!(api_error.error.code, "validation_error");
        assert_eq!(api_error.error.details.unwrap()["field"], "endTime");
    }

    #[tokio::test]
    async fn still_running_into_response() {
        let id: JobId = "job9".parse().unwrap();
        let response = Error::StillRunning {
            id,
            phase: Phase::Processing,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let details = body_of(response).await.error.details.unwrap();
        assert_eq!(details["job_id"], "job9");
        assert_eq!(details["phase"], "processing");
    }

    #[tokio::test]
    async fn not_found_into_response() {
        let response = Error::NotFound("job abc".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let api_error = body_of(response).await;
        assert_eq!(api_error.error.code, "not_found");
        assert!(api_error.error.message.contains("job abc"));
    }

    #[tokio::test]
    async fn bare_api_error_is_internal() {
        let response = ApiError::internal("boom").into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
