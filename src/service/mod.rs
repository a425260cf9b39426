//! Host-facing service split into focused submodules.
//!
//! The `SliceDownloader` struct and its methods are organized by domain:
//! - [`jobs`] - Starting jobs, subscribing and job lookups
//! - [`artifact`] - Retrieval of finished artifacts
//! - [`lifecycle`] - Expiry sweeps and shutdown coordination
//! - [`validation`] - Start request checks and file naming

pub mod artifact;
mod jobs;
mod lifecycle;
pub mod validation;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use artifact::{ArtifactHandle, RetrievalStream};

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::orchestrator::Orchestrator;
use crate::process::{PhaseRunner, ProcessRunner};
use crate::registry::JobRegistry;

/// Slice download service
///
/// Owns the job registry and the orchestrator; cheap to clone, every field is
/// shared.
#[derive(Clone)]
pub struct SliceDownloader {
    /// Static configuration
    pub config: Arc<Config>,
    /// Every job record, running or finished
    pub(crate) registry: Arc<JobRegistry>,
    /// Runs jobs through both phases
    pub(crate) orchestrator: Orchestrator,
    /// Cancelled once on shutdown; stops running jobs and background loops
    pub(crate) shutdown_token: CancellationToken,
    /// Set to false during shutdown
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Job tasks, awaited on shutdown
    pub(crate) tasks: TaskTracker,
}

impl SliceDownloader {
    /// Create a service that runs the real external tools
    ///
    /// Validates the configuration and creates the temp directory.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use slice_dl::{Config, SliceDownloader, StartRequest};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = SliceDownloader::new(Config::default()).await?;
    ///
    ///     let job_id = downloader.start(StartRequest {
    ///         url: "https://media.example.com/watch?v=abc".to_string(),
    ///         start_time: 30.0,
    ///         end_time: 90.0,
    ///         filename: None,
    ///         bitrate_hint: None,
    ///     })?;
    ///     println!("started {}", job_id);
    ///
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_runner(config, Arc::new(ProcessRunner::new())).await
    }

    /// Create a service with a custom phase runner
    pub async fn with_runner(config: Config, runner: Arc<dyn PhaseRunner>) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(config.temp_dir())
            .await
            .map_err(|e| Error::Config {
                message: format!(
                    "failed to create temp directory {}: {}",
                    config.temp_dir().display(),
                    e
                ),
                key: Some("temp_dir".to_string()),
            })?;

        let config = Arc::new(config);
        let shutdown_token = CancellationToken::new();
        let orchestrator = Orchestrator::new(config.clone(), runner, shutdown_token.clone());

        tracing::info!(
            temp_dir = %config.temp_dir().display(),
            "slice downloader initialized"
        );

        Ok(Self {
            config,
            registry: Arc::new(JobRegistry::new()),
            orchestrator,
            shutdown_token,
            accepting_new: Arc::new(AtomicBool::new(true)),
            tasks: TaskTracker::new(),
        })
    }

    /// Spawn the REST API server in a background task
    pub fn spawn_api_server(self: &Arc<Self>) -> tokio::task::JoinHandle<Result<()>> {
        let downloader = self.clone();
        let config = self.config.clone();
        tokio::spawn(async move { crate::api::start_api_server(downloader, config).await })
    }

    /// Number of jobs currently held, running or finished
    pub fn job_count(&self) -> usize {
        self.registry.len()
    }
}
