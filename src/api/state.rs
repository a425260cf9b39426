//! Application state for the API server

use crate::{Config, SliceDownloader};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request (cheap Arc clone).
#[derive(Clone)]
pub struct AppState {
    /// The service every handler delegates to
    pub downloader: Arc<SliceDownloader>,

    /// Configuration (read-only)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(downloader: Arc<SliceDownloader>, config: Arc<Config>) -> Self {
        Self { downloader, config }
    }
}
