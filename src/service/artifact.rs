//! Retrieval of finished artifacts
//!
//! A completed job's output is handed out exactly once per retrieval: the
//! job record and every file of the job are deleted when the body stream ends,
//! whether it was read to the end, failed, or was dropped by a disconnecting
//! client.

use futures::Stream;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::error::{Error, Result};
use crate::orchestrator::cleanup;
use crate::types::{JobId, Phase};

use super::SliceDownloader;

/// An opened output file of a completed job
#[derive(Debug)]
pub struct ArtifactHandle {
    pub job_id: JobId,
    pub path: PathBuf,
    /// Name offered to the client
    pub filename: String,
    /// Size in bytes at open time
    pub size: u64,
    file: File,
}

impl ArtifactHandle {
    /// Stream the file, finishing the retrieval once the stream ends or is dropped
    pub fn into_stream(self, downloader: SliceDownloader) -> RetrievalStream {
        RetrievalStream {
            inner: ReaderStream::new(self.file),
            guard: Some(RetrievalGuard {
                downloader,
                job_id: self.job_id,
            }),
        }
    }
}

/// Byte stream over an artifact that cleans up after itself
pub struct RetrievalStream {
    inner: ReaderStream<File>,
    guard: Option<RetrievalGuard>,
}

impl Stream for RetrievalStream {
    type Item = <ReaderStream<File> as Stream>::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = Pin::new(&mut self.inner).poll_next(cx);
        if let Poll::Ready(None) = polled {
            // Fully sent; release now rather than when the body is dropped
            self.guard.take();
        }
        polled
    }
}

struct RetrievalGuard {
    downloader: SliceDownloader,
    job_id: JobId,
}

impl Drop for RetrievalGuard {
    fn drop(&mut self) {
        let downloader = self.downloader.clone();
        let id = self.job_id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    downloader.finish_retrieval(&id).await;
                });
            }
            Err(_) => {
                tracing::warn!(job_id = %id, "no runtime to clean up retrieved artifact");
            }
        }
    }
}

impl SliceDownloader {
    /// Open the output of a completed job for streaming
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown jobs, `NotReady` while the job is not completed.
    pub async fn open_artifact(&self, id: &JobId) -> Result<ArtifactHandle> {
        let handle = self
            .registry
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("job {}", id)))?;

        let phase = handle.phase();
        let path = match (phase, handle.output_path()) {
            (Phase::Completed, Some(path)) => path,
            _ => {
                return Err(Error::NotReady {
                    id: id.clone(),
                    phase,
                });
            }
        };

        let file = File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ArtifactMissing {
                    phase: Phase::Processing,
                    path: path.clone(),
                }
            } else {
                Error::Io(e)
            }
        })?;
        let size = file.metadata().await?.len();

        tracing::debug!(job_id = %id, size, "artifact opened for retrieval");

        Ok(ArtifactHandle {
            job_id: id.clone(),
            path,
            filename: handle.filename(),
            size,
            file,
        })
    }

    /// Forget a job and delete its files
    ///
    /// Safe to call more than once; returns whether the job was still known.
    pub async fn finish_retrieval(&self, id: &JobId) -> bool {
        let known = self.registry.remove(id).is_some();
        cleanup::remove_job_files(self.config.temp_dir(), id).await;
        if known {
            tracing::info!(job_id = %id, "job released");
        }
        known
    }

    /// Remove a finished job and its files
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown jobs, `StillRunning` while the job has not
    /// reached a terminal phase.
    pub async fn delete_job(&self, id: &JobId) -> Result<()> {
        let handle = self
            .registry
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("job {}", id)))?;

        let phase = handle.phase();
        if !phase.is_terminal() {
            return Err(Error::StillRunning {
                id: id.clone(),
                phase,
            });
        }

        self.finish_retrieval(id).await;
        Ok(())
    }
}
