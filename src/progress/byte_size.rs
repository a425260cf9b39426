//! Byte-size progress: compare the growing partial file against a predicted size

use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Size an acquisition is expected to reach for `duration_seconds` at `bitrate_bps`
pub fn predicted_bytes(bitrate_bps: f64, duration_seconds: f64) -> f64 {
    (bitrate_bps / 8.0 * duration_seconds).max(0.0)
}

#[derive(Debug, Clone)]
pub struct ByteSizeProgress {
    predicted_bytes: f64,
    target_seconds: f64,
    percent: f64,
}

impl ByteSizeProgress {
    pub fn new(predicted_bytes: f64, target_seconds: f64) -> Self {
        Self {
            predicted_bytes,
            target_seconds,
            percent: 0.0,
        }
    }

    /// Record one file size sample and return the resulting percent
    pub fn observe_size(&mut self, bytes: u64) -> f64 {
        if self.predicted_bytes > 0.0 {
            let raw = (bytes as f64 / self.predicted_bytes * 100.0).min(100.0);
            // A shrinking file (rewritten header, truncation) must not move progress back
            self.percent = self.percent.max(raw);
        }
        self.percent
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn processed_seconds(&self) -> f64 {
        self.percent / 100.0 * self.target_seconds
    }
}

/// Sample the size of `path` every `interval` until `cancel` fires
///
/// Missing files are skipped silently; the acquisition tool may not have
/// created the output yet. The first sample is taken immediately.
pub fn spawn_byte_size_poller<F>(
    path: PathBuf,
    interval: Duration,
    cancel: CancellationToken,
    on_sample: F,
) -> JoinHandle<()>
where
    F: Fn(u64) + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(path = %path.display(), "byte size poller stopped");
                    break;
                }
                _ = ticker.tick() => {
                    match tokio::fs::metadata(&path).await {
                        Ok(metadata) => on_sample(metadata.len()),
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => {
                            tracing::warn!(path = %path.display(), error = %e, "failed to stat partial file");
                        }
                    }
                }
            }
        }
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn predicted_size_from_bitrate() {
        // 8 Mbit/s for 10s is 10 MB
        assert_eq!(predicted_bytes(8_000_000.0, 10.0), 10_000_000.0);
    }

    #[test]
    fn percent_is_capped_and_monotone() {
        let mut progress = ByteSizeProgress::new(1000.0, 20.0);

        assert_eq!(progress.observe_size(250), 25.0);
        assert_eq!(progress.processed_seconds(), 5.0);
        assert_eq!(progress.observe_size(100), 25.0);
        assert_eq!(progress.observe_size(5000), 100.0);
    }

    #[test]
    fn zero_prediction_never_advances() {
        let mut progress = ByteSizeProgress::new(0.0, 20.0);
        assert_eq!(progress.observe_size(5000), 0.0);
    }

    #[tokio::test]
    async fn poller_reports_sizes_and_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.part.mp4");
        tokio::fs::write(&path, vec![0u8; 128]).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = spawn_byte_size_poller(
            path.clone(),
            Duration::from_millis(10),
            cancel.clone(),
            move |size| {
                let _ = tx.send(size);
            },
        );

        assert_eq!(rx.recv().await, Some(128));

        tokio::fs::write(&path, vec![0u8; 512]).await.unwrap();
        loop {
            if rx.recv().await == Some(512) {
                break;
            }
        }

        cancel.cancel();
        handle.await.unwrap();
        // The sender was moved into the task, so the channel closes once it ends
        while rx.recv().await.is_some() {}
    }

    #[tokio::test]
    async fn poller_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel::<u64>();
        let cancel = CancellationToken::new();
        let handle = spawn_byte_size_poller(
            dir.path().join("not-yet.part"),
            Duration::from_millis(5),
            cancel.clone(),
            move |size| {
                let _ = tx.send(size);
            },
        );

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
