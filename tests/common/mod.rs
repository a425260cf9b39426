//! Common test utilities for slice-dl integration tests
//!
//! Jobs run the real process runner against small shell scripts that behave
//! like yt-dlp and ffmpeg: they print progress the way the real tools do and
//! write the file named on their command line.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use slice_dl::config::{Config, ToolsConfig};
use slice_dl::{JobEvent, JobId, JobObserver, Phase, SliceDownloader, StartRequest};

const YT_DLP: &str = r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
echo "[info] Downloading 1 time ranges"
echo "[download] Segment 1 complete"
echo "[download] Segment 2 complete"
head -c 2048 /dev/zero > "$out"
echo "[download] 100% of 2.00KiB"
"#;

const YT_DLP_FAILING: &str = r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
echo "[download] Segment 1 complete"
head -c 100 /dev/zero > "$out"
echo "ERROR: unable to download video data: HTTP Error 403" >&2
exit 1
"#;

const FFMPEG: &str = r#"#!/bin/sh
for last; do :; done
printf 'out_time_us=2500000\nprogress=continue\n'
head -c 4096 /dev/zero > "$last"
printf 'out_time_us=5000000\nprogress=end\n'
"#;

const FFMPEG_HANGING: &str = r#"#!/bin/sh
printf 'out_time_us=1000000\nprogress=continue\n'
exec sleep 30
"#;

/// Directory holding the fake tools, created once per test binary
pub fn tools_dir() -> &'static Path {
    static DIR: OnceLock<PathBuf> = OnceLock::new();
    DIR.get_or_init(|| {
        let dir = std::env::temp_dir().join(format!("slice-dl-tools-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for (name, script) in [
            ("yt-dlp", YT_DLP),
            ("yt-dlp-failing", YT_DLP_FAILING),
            ("ffmpeg", FFMPEG),
            ("ffmpeg-hanging", FFMPEG_HANGING),
        ] {
            let path = dir.join(name);
            std::fs::write(&path, script).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        dir
    })
}

/// Config using the named fake tools and a fresh temp dir
pub fn config_with_tools(temp: &tempfile::TempDir, yt_dlp: &str, ffmpeg: &str) -> Config {
    let tools = tools_dir();
    let mut config = Config::default();
    config.download.temp_dir = temp.path().join("work");
    config.tools = ToolsConfig {
        yt_dlp_path: Some(tools.join(yt_dlp)),
        ffmpeg_path: Some(tools.join(ffmpeg)),
        search_path: false,
    };
    config
}

pub async fn create_downloader(yt_dlp: &str, ffmpeg: &str) -> (SliceDownloader, tempfile::TempDir) {
    let temp = tempfile::tempdir().unwrap();
    let config = config_with_tools(&temp, yt_dlp, ffmpeg);
    let downloader = SliceDownloader::new(config).await.unwrap();
    (downloader, temp)
}

pub fn five_second_slice() -> StartRequest {
    StartRequest {
        url: "https://media.example.com/watch?v=abc".to_string(),
        start_time: 60.0,
        end_time: 65.0,
        filename: Some("moment".to_string()),
        bitrate_hint: None,
    }
}

/// Observer that records events into a channel
pub struct ChannelObserver(tokio::sync::mpsc::UnboundedSender<JobEvent>);

impl ChannelObserver {
    pub fn new() -> (
        std::sync::Arc<Self>,
        tokio::sync::mpsc::UnboundedReceiver<JobEvent>,
    ) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (std::sync::Arc::new(Self(tx)), rx)
    }
}

impl JobObserver for ChannelObserver {
    fn on_event(&self, event: &JobEvent) {
        let _ = self.0.send(event.clone());
    }
}

/// Collect events until the terminal one
pub async fn collect_until_terminal(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<JobEvent>,
) -> Vec<JobEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(20), rx.recv())
            .await
            .expect("timed out waiting for job events")
            .expect("event channel closed");
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            return events;
        }
    }
}

/// Files left in the temp dir for `id`
pub fn job_files(downloader: &SliceDownloader, id: &JobId) -> Vec<PathBuf> {
    let prefix = format!("{}.", id);
    std::fs::read_dir(downloader.config.temp_dir())
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
                .map(|entry| entry.path())
                .collect()
        })
        .unwrap_or_default()
}

/// Progress values of one phase, in order
pub fn progress_of(events: &[JobEvent], wanted: Phase) -> Vec<u8> {
    events
        .iter()
        .filter_map(|event| match event {
            JobEvent::Progress {
                phase, progress, ..
            } if *phase == wanted => Some(*progress),
            _ => None,
        })
        .collect()
}
