//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`jobs`]: Starting, inspecting, removing jobs and retrieving artifacts
//! - [`events`]: Server-sent events stream of one job
//! - [`channel`]: WebSocket channel
//! - [`system`]: Health and OpenAPI

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::registry::JobObserver;
use crate::types::JobEvent;

pub mod channel;
mod events;
mod jobs;
mod system;

// Re-export all handlers so `routes::function_name` works
pub use channel::*;
pub use events::*;
pub use jobs::*;
pub use system::*;

/// Observer that forwards job events into a channel
///
/// Transport adapters own the receiving side; a closed receiver just drops
/// the event, the subscription itself is released by its owner.
pub(crate) struct ForwardingObserver<T> {
    tx: mpsc::UnboundedSender<T>,
    convert: fn(&JobEvent) -> T,
}

impl<T: Send + 'static> ForwardingObserver<T> {
    pub(crate) fn new(tx: mpsc::UnboundedSender<T>, convert: fn(&JobEvent) -> T) -> Arc<Self> {
        Arc::new(Self { tx, convert })
    }
}

impl<T: Send + 'static> JobObserver for ForwardingObserver<T> {
    fn on_event(&self, event: &JobEvent) {
        let _ = self.tx.send((self.convert)(event));
    }
}
