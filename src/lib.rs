//! # slice-dl
//!
//! Background job service that downloads a time range of a remote video and
//! remuxes it into a playable file, reporting live progress along the way.
//!
//! Each job runs two external tools in sequence: `yt-dlp` acquires the slice,
//! `ffmpeg` copies it into a fresh container with normalized timestamps.
//! Progress is estimated from the tools' output (or the growing file size),
//! published to any number of observers, and the finished artifact can be
//! fetched exactly once.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use slice_dl::{Config, JobEvent, JobObserver, SliceDownloader, StartRequest};
//!
//! struct Printer;
//!
//! impl JobObserver for Printer {
//!     fn on_event(&self, event: &JobEvent) {
//!         println!("{:?}", event);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = SliceDownloader::new(Config::default()).await?;
//!
//!     let job_id = downloader.start(StartRequest {
//!         url: "https://media.example.com/watch?v=abc".to_string(),
//!         start_time: 30.0,
//!         end_time: 90.0,
//!         filename: Some("highlight".to_string()),
//!         bitrate_hint: None,
//!     })?;
//!
//!     // Keep the subscription alive for as long as events are wanted
//!     let _subscription = downloader.subscribe(&job_id, Arc::new(Printer))?;
//!
//!     slice_dl::run_with_shutdown(downloader).await;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Per-job pipeline driving both phases
pub mod orchestrator;
/// External process execution and tool discovery
pub mod process;
/// Progress estimation from tool output
pub mod progress;
/// Job registry and observer fan-out
pub mod registry;
/// Host-facing service
pub mod service;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{ApiError, Error, ErrorDetail, Result, ToHttpStatus};
pub use process::{PhaseRunner, ProcessRunner};
pub use registry::{JobObserver, JobRegistry, Subscription};
pub use service::{ArtifactHandle, SliceDownloader};
pub use types::{JobEvent, JobId, JobInfo, Phase, ProgressSnapshot, StartRequest, StartResponse};

/// Run until a termination signal arrives, then shut the downloader down.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use slice_dl::{SliceDownloader, Config, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = Arc::new(SliceDownloader::new(Config::default()).await?);
///     let _api = downloader.spawn_api_server();
///     let _reaper = downloader.spawn_reaper();
///
///     run_with_shutdown((*downloader).clone()).await;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: SliceDownloader) {
    wait_for_signal().await;
    downloader.shutdown().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
