//! Server-sent events stream of one job.

use super::ForwardingObserver;
use crate::api::AppState;
use crate::error::Result;
use crate::registry::Subscription;
use crate::types::{JobEvent, JobId};
use axum::{
    extract::{Path, State},
    http::{HeaderName, header},
    response::{
        IntoResponse, Response,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use futures::Stream;
use std::convert::Infallible;
use tokio::sync::mpsc;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// GET /jobs/:id/events - Server-sent events stream
///
/// Each frame is a bare `data:` line holding one JSON event. The stream ends
/// right after the `complete` or `error` event. Events published before the
/// client attached are not replayed; for a job that already finished the
/// stream ends without frames.
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}/events",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Server-sent events stream (text/event-stream)", content_type = "text/event-stream", body = JobEvent),
        (status = 404, description = "Job not found", body = crate::error::ApiError)
    )
)]
pub async fn job_events(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    let id: JobId = id.parse()?;
    let (tx, rx) = mpsc::unbounded_channel();
    let subscription = state
        .downloader
        .subscribe(&id, ForwardingObserver::new(tx, |event| event.clone()))?;

    // Checked after subscribing so a terminal event racing with us is still queued
    let running = state
        .downloader
        .job_info(&id)
        .is_ok_and(|info| !info.phase.is_terminal());
    let subscription = if !running {
        tracing::debug!(job_id = %id, "SSE client attached to finished job");
        drop(subscription);
        None
    } else {
        tracing::debug!(job_id = %id, "SSE client attached");
        Some(subscription)
    };

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Sse::new(event_frames(rx, subscription)).keep_alive(KeepAlive::default()),
    )
        .into_response())
}

/// Frames for every received event, ending after the terminal one
///
/// The subscription lives inside the stream, so dropping the stream (client
/// gone) or finishing it releases the listener. Without a subscription the
/// observer is already gone and the stream drains what was queued, then ends.
fn event_frames(
    rx: mpsc::UnboundedReceiver<JobEvent>,
    subscription: Option<Subscription>,
) -> impl Stream<Item = std::result::Result<SseEvent, Infallible>> {
    futures::stream::unfold(Some((rx, subscription)), |state| async move {
        let (mut rx, subscription) = state?;
        let event = rx.recv().await?;

        let next = if event.is_terminal() {
            tracing::debug!(job_id = %event.job_id(), "SSE stream finished");
            None
        } else {
            Some((rx, subscription))
        };
        Some((Ok(frame(&event)), next))
    })
}

fn frame(event: &JobEvent) -> SseEvent {
    match serde_json::to_string(event) {
        Ok(json) => SseEvent::default().data(json),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to serialize event to JSON");
            SseEvent::default().comment("unserializable event")
        }
    }
}
