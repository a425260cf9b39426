//! Job handlers.

use crate::api::AppState;
use crate::error::{Error, Result};
use crate::types::{JobId, JobInfo, StartRequest, StartResponse};
use axum::{
    Json,
    body::Body,
    extract::{Path, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

/// POST /jobs - Start a job
#[utoipa::path(
    post,
    path = "/api/v1/jobs",
    tag = "jobs",
    request_body = StartRequest,
    responses(
        (status = 202, description = "Job accepted", body = StartResponse),
        (status = 400, description = "Invalid request", body = crate::error::ApiError),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    )
)]
pub async fn start_job(
    State(state): State<AppState>,
    payload: std::result::Result<Json<StartRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StartResponse>)> {
    let Json(request) = payload.map_err(|rejection| Error::validation("body", rejection.body_text()))?;

    let job_id = state.downloader.start(request)?;
    Ok((StatusCode::ACCEPTED, Json(StartResponse { job_id })))
}

/// GET /jobs - List jobs
#[utoipa::path(
    get,
    path = "/api/v1/jobs",
    tag = "jobs",
    responses(
        (status = 200, description = "Every job, oldest first", body = Vec<JobInfo>)
    )
)]
pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobInfo>> {
    Json(state.downloader.list_jobs())
}

/// GET /jobs/:id - Get single job
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job information", body = JobInfo),
        (status = 404, description = "Job not found", body = crate::error::ApiError)
    )
)]
pub async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<JobInfo>> {
    let id: JobId = id.parse()?;
    Ok(Json(state.downloader.job_info(&id)?))
}

/// DELETE /jobs/:id - Remove a finished job and its files
#[utoipa::path(
    delete,
    path = "/api/v1/jobs/{id}",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 204, description = "Job removed"),
        (status = 404, description = "Job not found", body = crate::error::ApiError),
        (status = 409, description = "Job is still running", body = crate::error::ApiError)
    )
)]
pub async fn delete_job(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    let id: JobId = id.parse()?;
    state.downloader.delete_job(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /jobs/:id/file - Download the finished artifact
///
/// The job and its files are removed once the body has been sent or the
/// client went away, so each artifact can be fetched once.
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}/file",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Artifact bytes", content_type = "video/mp4"),
        (status = 400, description = "Job has not completed", body = crate::error::ApiError),
        (status = 404, description = "Job not found", body = crate::error::ApiError)
    )
)]
pub async fn download_file(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    let id: JobId = id.parse()?;
    let artifact = state.downloader.open_artifact(&id).await?;

    let content_type = content_type_for(&state.config.download.output_extension);
    let disposition = format!("attachment; filename=\"{}\"", artifact.filename);
    let length = artifact.size;

    tracing::info!(job_id = %id, size = length, "serving artifact");

    let body = Body::from_stream(artifact.into_stream((*state.downloader).clone()));
    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, length.to_string()),
        ],
        body,
    )
        .into_response())
}

fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}
