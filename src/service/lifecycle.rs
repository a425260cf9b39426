//! Expiry of uncollected jobs and shutdown coordination.

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::orchestrator::cleanup;

use super::SliceDownloader;

/// How long shutdown waits for running jobs to wind down
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl SliceDownloader {
    /// Remove terminal jobs older than the configured TTL, with their files
    ///
    /// Returns how many jobs were removed.
    pub async fn reap_expired(&self) -> usize {
        let expired = self
            .registry
            .terminal_jobs_older_than(self.config.retention.job_ttl);

        let mut reaped = 0;
        for id in expired {
            if self.finish_retrieval(&id).await {
                reaped += 1;
            }
        }

        if reaped > 0 {
            tracing::info!(reaped, "expired jobs removed");
        }
        reaped
    }

    /// Spawn the background sweep that expires uncollected jobs
    ///
    /// Stops when the service shuts down.
    pub fn spawn_reaper(&self) -> tokio::task::JoinHandle<()> {
        let downloader = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(downloader.config.retention.sweep_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        downloader.reap_expired().await;
                    }
                    _ = downloader.shutdown_token.cancelled() => {
                        tracing::debug!("job reaper stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Whether new jobs are still accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }

    /// Gracefully shut down the service
    ///
    /// 1. Stops accepting new jobs
    /// 2. Cancels running jobs; they end with an error event
    /// 3. Waits for job tasks with a timeout (30 seconds)
    /// 4. Removes every job record and its files
    pub async fn shutdown(&self) {
        tracing::info!("Initiating graceful shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new jobs");

        self.shutdown_token.cancel();
        self.tasks.close();

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.tasks.wait()).await {
            Ok(()) => tracing::info!("All running jobs stopped"),
            Err(_) => {
                tracing::warn!("Timeout waiting for jobs to stop, proceeding with shutdown");
            }
        }

        let ids = self.registry.ids();
        for id in &ids {
            self.registry.remove(id);
            cleanup::remove_job_files(self.config.temp_dir(), id).await;
        }
        tracing::info!(removed = ids.len(), "Graceful shutdown complete");
    }
}
