//! Shared test helpers for creating SliceDownloader instances in tests.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use crate::config::{Config, ToolsConfig};
use crate::process::{
    Invocation, OutputChunk, OutputSink, OutputStream, PhaseRunner, ProcessOutcome, ProcessStatus,
};
use crate::registry::JobObserver;
use crate::service::SliceDownloader;
use crate::types::JobEvent;

/// PhaseRunner that pretends to be yt-dlp and ffmpeg
///
/// Acquisition prints two segment lines and writes the intermediate file,
/// remux prints key/value progress and writes the output file. With a gate,
/// acquisition blocks until [`StubRunner::release`] is called.
pub(crate) struct StubRunner {
    gate: Option<Notify>,
    fail_acquire: bool,
    labels: Mutex<Vec<String>>,
}

impl StubRunner {
    pub(crate) fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            gate: None,
            fail_acquire: false,
            labels: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self {
            gate: None,
            fail_acquire: true,
            labels: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Notify::new()),
            fail_acquire: false,
            labels: Mutex::new(Vec::new()),
        })
    }

    /// Let a gated acquisition finish
    pub(crate) fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub(crate) fn labels(&self) -> Vec<String> {
        self.labels.lock().unwrap().clone()
    }
}

fn send(sink: &OutputSink, stream: OutputStream, text: &str) {
    let _ = sink.send(OutputChunk {
        stream,
        text: text.to_string(),
    });
}

fn output_path(invocation: &Invocation) -> PathBuf {
    let args: Vec<_> = invocation.args.iter().collect();
    match args.iter().position(|a| a.as_os_str() == "-o") {
        Some(i) => PathBuf::from(args[i + 1]),
        None => PathBuf::from(args[args.len() - 1]),
    }
}

#[async_trait]
impl PhaseRunner for StubRunner {
    async fn run(&self, invocation: &Invocation, sink: OutputSink) -> ProcessOutcome {
        self.labels.lock().unwrap().push(invocation.label.clone());
        let path = output_path(invocation);

        if invocation.label == "acquire" {
            send(&sink, OutputStream::Stdout, "[download] Segment 1 complete\n");
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail_acquire {
                tokio::fs::write(&path, b"partial").await.unwrap();
                return ProcessOutcome {
                    status: ProcessStatus::Failed(Some(1)),
                    stderr_tail: "ERROR: unable to download".into(),
                    elapsed: Duration::from_millis(5),
                };
            }
            send(&sink, OutputStream::Stdout, "[download] Segment 2 complete\n");
            tokio::fs::write(&path, vec![7u8; 2048]).await.unwrap();
        } else {
            send(&sink, OutputStream::Stdout, "out_time_us=2500000\nprogress=continue\n");
            tokio::fs::write(&path, vec![9u8; 4096]).await.unwrap();
            send(&sink, OutputStream::Stdout, "out_time_us=5000000\nprogress=end\n");
        }

        ProcessOutcome {
            status: ProcessStatus::Succeeded,
            stderr_tail: String::new(),
            elapsed: Duration::from_millis(5),
        }
    }
}

/// Config pointing at a temp dir, with dummy tool binaries that are never run
pub(crate) fn test_config(dir: &tempfile::TempDir) -> Config {
    let tools = dir.path().join("bin");
    std::fs::create_dir_all(&tools).unwrap();
    std::fs::write(tools.join("yt-dlp"), b"").unwrap();
    std::fs::write(tools.join("ffmpeg"), b"").unwrap();

    let mut config = Config::default();
    config.download.temp_dir = dir.path().join("temp");
    config.tools = ToolsConfig {
        yt_dlp_path: Some(tools.join("yt-dlp")),
        ffmpeg_path: Some(tools.join("ffmpeg")),
        search_path: false,
    };
    config
}

/// Helper to create a test SliceDownloader with the given runner.
/// Returns the downloader and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader(
    runner: Arc<StubRunner>,
) -> (SliceDownloader, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let downloader = SliceDownloader::with_runner(config, runner).await.unwrap();
    (downloader, dir)
}

/// Observer that records every event it receives
#[derive(Default)]
pub(crate) struct Recorder(Mutex<Vec<JobEvent>>);

impl Recorder {
    pub(crate) fn events(&self) -> Vec<JobEvent> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn terminal(&self) -> Option<JobEvent> {
        self.events().into_iter().find(JobEvent::is_terminal)
    }
}

impl JobObserver for Recorder {
    fn on_event(&self, event: &JobEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

/// Poll until `check` holds, failing the test after a few seconds
pub(crate) async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
