//! Starting jobs and looking them up.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::error::{Error, Result};
use crate::registry::{JobObserver, Subscription};
use crate::types::{JobId, JobInfo, StartRequest};

use super::SliceDownloader;
use super::validation::validate_request;

impl SliceDownloader {
    /// Validate `request` and start a job for it
    ///
    /// Returns as soon as the job record exists; the work happens in a
    /// background task. Invalid requests create nothing.
    pub fn start(&self, request: StartRequest) -> Result<JobId> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let filename = validate_request(&request, &self.config.download)?;
        let id = JobId::generate();
        let handle = self
            .registry
            .create_or_attach(&id, &filename, request.duration());

        tracing::info!(
            job_id = %id,
            filename = %filename,
            duration = request.duration(),
            "job accepted"
        );

        let orchestrator = self.orchestrator.clone();
        self.tasks.spawn(async move {
            let job = tokio::spawn({
                let handle = handle.clone();
                async move { orchestrator.run(handle, request).await }
            });

            // A panicking job still ends with an error event
            if let Err(e) = job.await {
                tracing::error!(job_id = %handle.id(), error = %e, "job task panicked");
                handle.fail(Error::ApiServerError(e.to_string()).user_message());
            }
        });

        Ok(id)
    }

    /// Attach an observer to a job's events
    pub fn subscribe(&self, id: &JobId, observer: Arc<dyn JobObserver>) -> Result<Subscription> {
        self.registry.subscribe(id, observer)
    }

    /// Public view of one job
    pub fn job_info(&self, id: &JobId) -> Result<JobInfo> {
        self.registry
            .snapshot(id)
            .ok_or_else(|| Error::NotFound(format!("job {}", id)))
    }

    /// Public view of every job
    pub fn list_jobs(&self) -> Vec<JobInfo> {
        let mut jobs: Vec<JobInfo> = self
            .registry
            .ids()
            .iter()
            .filter_map(|id| self.registry.snapshot(id))
            .collect();
        jobs.sort_by_key(|info| info.created_at);
        jobs
    }
}
