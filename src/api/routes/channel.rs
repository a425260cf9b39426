//! WebSocket channel: start jobs and follow their events over one connection.
//!
//! Client frames are `{"event":"start","data":<StartRequest>}` or
//! `{"event":"subscribe","data":{"jobId":"..."}}`. Server frames are
//! `{"event":"started"|"progress"|"complete"|"error","data":{...}}`.

use super::ForwardingObserver;
use crate::SliceDownloader;
use crate::api::AppState;
use crate::error::Error;
use crate::registry::Subscription;
use crate::types::{JobEvent, JobId, StartRequest};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Message received from a channel client
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Start a job and follow it
    Start(StartRequest),
    /// Follow an existing job
    Subscribe(SubscribeRequest),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub job_id: JobId,
}

/// Message sent to a channel client
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    pub event: String,
    pub data: serde_json::Value,
}

impl ServerMessage {
    fn started(job_id: &JobId) -> Self {
        Self {
            event: "started".to_string(),
            data: json!({ "jobId": job_id }),
        }
    }

    /// A request-level failure; not tied to a running job
    fn rejected(error: &Error, job_id: Option<&JobId>) -> Self {
        use crate::error::ToHttpStatus;

        let mut data = json!({
            "code": error.error_code(),
            "message": error.user_message(),
        });
        if let Some(id) = job_id {
            data["jobId"] = json!(id);
        }
        Self {
            event: "error".to_string(),
            data,
        }
    }

    /// Job this message finishes, if it is a terminal job event
    fn finished_job(&self) -> Option<JobId> {
        if self.event != "complete" && self.event != "error" {
            return None;
        }
        self.data
            .get("jobId")
            .and_then(|id| serde_json::from_value(id.clone()).ok())
    }
}

impl From<&JobEvent> for ServerMessage {
    fn from(event: &JobEvent) -> Self {
        Self {
            event: event.name().to_string(),
            data: event.payload(),
        }
    }
}

/// State of one channel connection, independent of the socket
pub struct ChannelSession {
    downloader: SliceDownloader,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    subscriptions: HashMap<JobId, Subscription>,
}

impl ChannelSession {
    /// Create a session whose outgoing messages go to `outbound`
    pub fn new(downloader: SliceDownloader, outbound: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            downloader,
            outbound,
            subscriptions: HashMap::new(),
        }
    }

    /// Handle one text frame from the client
    pub fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Start(request)) => self.start(request),
            Ok(ClientMessage::Subscribe(request)) => self.follow(request.job_id),
            Err(e) => {
                tracing::debug!(error = %e, "unreadable channel message");
                self.send(ServerMessage::rejected(
                    &Error::validation("message", e.to_string()),
                    None,
                ));
            }
        }
    }

    /// Note that `message` went out; terminal events release their subscription
    pub fn delivered(&mut self, message: &ServerMessage) {
        if let Some(id) = message.finished_job() {
            self.subscriptions.remove(&id);
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Drop every subscription; returns how many were held
    pub fn close(&mut self) -> usize {
        let count = self.subscriptions.len();
        self.subscriptions.clear();
        count
    }

    fn start(&mut self, request: StartRequest) {
        match self.downloader.start(request) {
            Ok(id) => {
                self.send(ServerMessage::started(&id));
                self.follow(id);
            }
            Err(e) => self.send(ServerMessage::rejected(&e, None)),
        }
    }

    fn follow(&mut self, id: JobId) {
        if self.subscriptions.contains_key(&id) {
            return;
        }
        let observer = ForwardingObserver::new(self.outbound.clone(), |event| ServerMessage::from(event));
        match self.downloader.subscribe(&id, observer) {
            Ok(subscription) => {
                // A finished job publishes nothing more; holding the listener would leak it
                let running = self
                    .downloader
                    .job_info(&id)
                    .is_ok_and(|info| !info.phase.is_terminal());
                if running {
                    self.subscriptions.insert(id, subscription);
                }
            }
            Err(e) => self.send(ServerMessage::rejected(&e, Some(&id))),
        }
    }

    fn send(&self, message: ServerMessage) {
        let _ = self.outbound.send(message);
    }
}

impl Drop for ChannelSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// GET /ws - WebSocket channel
#[utoipa::path(
    get,
    path = "/api/v1/ws",
    tag = "channel",
    responses(
        (status = 101, description = "Switching to the WebSocket channel")
    )
)]
pub async fn channel(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let downloader = (*state.downloader).clone();
    ws.on_upgrade(move |socket| run_channel(socket, downloader))
}

/// Why a channel loop ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChannelEnd {
    /// Client sent a close frame, which the socket already answered
    ClientClosed,
    /// Stream ended or failed without a close handshake
    ClientGone,
    /// Sending to the client failed
    SendFailed,
}

impl ChannelEnd {
    fn for_inbound(inbound: Option<&std::result::Result<Message, axum::Error>>) -> Option<Self> {
        match inbound {
            Some(Ok(Message::Close(_))) => Some(Self::ClientClosed),
            None | Some(Err(_)) => Some(Self::ClientGone),
            Some(Ok(_)) => None,
        }
    }

    /// Whether our side still has to send a close frame
    fn needs_close(self) -> bool {
        self != Self::ClientClosed
    }
}

async fn run_channel(socket: WebSocket, downloader: SliceDownloader) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = ChannelSession::new(downloader, tx);

    tracing::debug!("channel client connected");

    let end = loop {
        tokio::select! {
            inbound = stream.next() => {
                if let Some(end) = ChannelEnd::for_inbound(inbound.as_ref()) {
                    if let Some(Err(e)) = &inbound {
                        tracing::debug!(error = %e, "channel receive failed");
                    }
                    break end;
                }
                if let Some(Ok(Message::Text(text))) = inbound {
                    session.handle_text(&text);
                }
            },
            Some(message) = rx.recv() => {
                session.delivered(&message);
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to serialize channel message");
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break ChannelEnd::SendFailed;
                }
            }
        }
    };

    let released = session.close();
    tracing::debug!(released, ?end, "channel client disconnected");

    if end.needs_close() {
        if let Err(e) = sink.close().await {
            tracing::debug!(error = %e, "channel close failed");
        }
    }
}
