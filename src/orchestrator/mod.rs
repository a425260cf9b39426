//! Per-job pipeline
//!
//! One job runs as one task: acquisition, then remux, each as a single
//! external process. Progress goes out through the job's [`JobHandle`] only;
//! the orchestrator has no idea who is listening.
//!
//! Any failure, at any point, ends the same way: every file of the job is
//! removed, a single error event is published and the job is marked failed.

pub mod cleanup;
pub mod commands;
pub mod emitter;
pub mod state;

pub use commands::JobPaths;
pub use emitter::ProgressEmitter;
pub use state::{InvalidTransition, JobStateMachine};

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::process::{Invocation, PhaseRunner, ProcessOutcome, ProcessStatus, Tool, ToolLocator};
use crate::progress::{AcquisitionSignal, ProgressEstimator, SegmentTuning, spawn_byte_size_poller};
use crate::registry::JobHandle;
use crate::types::{JobId, Phase, StartRequest};

/// Drives jobs through both phases
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<Config>,
    runner: Arc<dyn PhaseRunner>,
    tools: ToolLocator,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: Arc<Config>, runner: Arc<dyn PhaseRunner>, shutdown: CancellationToken) -> Self {
        let tools = ToolLocator::new(config.tools.clone());
        Self {
            config,
            runner,
            tools,
            shutdown,
        }
    }

    /// Run a job to a terminal phase
    ///
    /// Never returns an error: failures are turned into the job's error event.
    pub async fn run(&self, handle: JobHandle, request: StartRequest) {
        let id = handle.id().clone();
        let paths = JobPaths::new(
            self.config.temp_dir(),
            &id,
            &self.config.download.output_extension,
        );
        let mut machine = JobStateMachine::new();

        info!(job_id = %id, url = %request.url, start = request.start_time, end = request.end_time, "job started");

        match self.run_phases(&handle, &request, &paths, &mut machine).await {
            Ok(output) => {
                if let Err(e) = machine.transition(Phase::Completed) {
                    error!(job_id = %id, error = %e, "state machine rejected completion");
                }
                handle.complete(output);
                info!(job_id = %id, "job completed");
            }
            Err(e) => {
                error!(job_id = %id, phase = ?machine.phase(), error = %e, "job failed");
                if let Err(transition) = machine.transition(Phase::Failed) {
                    debug!(job_id = %id, error = %transition, "failure after terminal phase");
                }
                cleanup::remove_job_files(&paths.temp_dir, &id).await;
                handle.fail(e.user_message());
            }
        }
    }

    async fn run_phases(
        &self,
        handle: &JobHandle,
        request: &StartRequest,
        paths: &JobPaths,
        machine: &mut JobStateMachine,
    ) -> Result<PathBuf> {
        let id = handle.id();
        let target = request.duration();
        let download = &self.config.download;
        let mut emitter = ProgressEmitter::new(handle.clone(), target);

        emitter.enter(Phase::Downloading);

        // Both tools are resolved up front so a missing remuxer fails before any download
        let yt_dlp = self.tools.locate(Tool::YtDlp)?;
        let ffmpeg = self.tools.locate(Tool::Ffmpeg)?;

        let estimator = ProgressEstimator::for_acquisition(
            target,
            request.bitrate_hint,
            SegmentTuning::from(&self.config.progress),
        );
        debug!(job_id = %id, signal = ?estimator.signal(), "acquisition progress signal selected");

        let invocation = commands::acquisition(&yt_dlp, request, paths, download);
        let outcome = self
            .run_phase(id, Phase::Downloading, &invocation, estimator, paths, &mut emitter)
            .await?;
        check_outcome(id, Phase::Downloading, &invocation, &outcome)?;

        let intermediate = paths
            .find_intermediate(id)
            .await
            .ok_or_else(|| Error::ArtifactMissing {
                phase: Phase::Downloading,
                path: paths.intermediate.clone(),
            })?;
        emitter.exit();

        machine.transition(Phase::Processing)?;
        handle.advance(Phase::Processing);
        emitter.enter(Phase::Processing);
        info!(job_id = %id, "acquisition finished, remuxing");

        let invocation = commands::remux(&ffmpeg, &intermediate, paths, download);
        let result = self
            .run_phase(
                id,
                Phase::Processing,
                &invocation,
                ProgressEstimator::for_remux(target),
                paths,
                &mut emitter,
            )
            .await;
        // The remux input is no longer needed whatever happened
        cleanup::remove_file_logged(&intermediate).await;
        let outcome = result?;
        check_outcome(id, Phase::Processing, &invocation, &outcome)?;

        if !commands::is_non_empty_file(&paths.output).await {
            return Err(Error::ArtifactMissing {
                phase: Phase::Processing,
                path: paths.output.clone(),
            });
        }
        emitter.exit();

        Ok(paths.output.clone())
    }

    /// Run one phase process while feeding its output into `estimator`
    async fn run_phase(
        &self,
        id: &JobId,
        phase: Phase,
        invocation: &Invocation,
        mut estimator: ProgressEstimator,
        paths: &JobPaths,
        emitter: &mut ProgressEmitter,
    ) -> Result<ProcessOutcome> {
        let (output_tx, mut output_rx) = mpsc::unbounded_channel();
        let (size_tx, mut size_rx) = mpsc::unbounded_channel::<u64>();
        let poll_cancel = self.shutdown.child_token();

        let poller = if estimator.signal() == Some(AcquisitionSignal::ByteSize) {
            Some(spawn_byte_size_poller(
                paths.intermediate.clone(),
                self.config.download.byte_poll_interval,
                poll_cancel.clone(),
                move |size| {
                    let _ = size_tx.send(size);
                },
            ))
        } else {
            drop(size_tx);
            None
        };

        debug!(job_id = %id, phase = ?phase, program = %invocation.program.display(), "phase process starting");
        let mut run = self.runner.run(invocation, output_tx);

        let outcome = loop {
            tokio::select! {
                outcome = &mut run => break Some(outcome),
                _ = self.shutdown.cancelled() => break None,
                Some(chunk) = output_rx.recv() => {
                    if estimator.observe_output(&chunk).is_some() {
                        emitter.update(estimator.percent(), estimator.processed_seconds());
                    }
                }
                Some(size) = size_rx.recv() => {
                    if estimator.observe_size(size).is_some() {
                        emitter.update(estimator.percent(), estimator.processed_seconds());
                    }
                }
            }
        };

        // Polling ends with the phase
        poll_cancel.cancel();
        if let Some(poller) = poller {
            let _ = poller.await;
        }

        let Some(outcome) = outcome else {
            // Dropping the run future kills the child
            drop(run);
            return Err(Error::ShuttingDown);
        };

        while let Ok(chunk) = output_rx.try_recv() {
            if estimator.observe_output(&chunk).is_some() {
                emitter.update(estimator.percent(), estimator.processed_seconds());
            }
        }
        if estimator.finish().is_some() {
            emitter.update(estimator.percent(), estimator.processed_seconds());
        }

        Ok(outcome)
    }
}

fn check_outcome(
    id: &JobId,
    phase: Phase,
    invocation: &Invocation,
    outcome: &ProcessOutcome,
) -> Result<()> {
    let err = match &outcome.status {
        ProcessStatus::Succeeded => return Ok(()),
        ProcessStatus::Failed(code) => Error::ProcessFailure {
            phase,
            exit_code: *code,
        },
        ProcessStatus::SpawnFailed(reason) => {
            error!(job_id = %id, phase = ?phase, reason = %reason, "phase process could not start");
            Error::ProcessFailure {
                phase,
                exit_code: None,
            }
        }
        ProcessStatus::TimedOut => Error::Timeout {
            phase,
            after: invocation.timeout,
        },
    };

    error!(
        job_id = %id,
        phase = ?phase,
        status = ?outcome.status,
        elapsed = ?outcome.elapsed,
        stderr_tail = %outcome.stderr_tail,
        "phase process failed"
    );
    Err(err)
}
