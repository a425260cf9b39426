//! Command lines and file locations for the two phases

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::DownloadConfig;
use crate::process::Invocation;
use crate::progress::format_duration;
use crate::types::{JobId, StartRequest};

/// Where a job's files live
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobPaths {
    pub temp_dir: PathBuf,
    /// Acquisition output, `<jobId>.part.<ext>`
    pub intermediate: PathBuf,
    /// Remux output, `<jobId>.<ext>`
    pub output: PathBuf,
}

impl JobPaths {
    pub fn new(temp_dir: &Path, id: &JobId, extension: &str) -> Self {
        Self {
            temp_dir: temp_dir.to_path_buf(),
            intermediate: temp_dir.join(format!("{}.part.{}", id, extension)),
            output: temp_dir.join(format!("{}.{}", id, extension)),
        }
    }

    /// The acquisition result
    ///
    /// Falls back to any other `<jobId>.part*` file when the acquisition tool
    /// chose its own extension, skipping its fragment leftovers.
    pub async fn find_intermediate(&self, id: &JobId) -> Option<PathBuf> {
        if is_non_empty_file(&self.intermediate).await {
            return Some(self.intermediate.clone());
        }

        let prefix = format!("{}.part", id);
        let mut entries = tokio::fs::read_dir(&self.temp_dir).await.ok()?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            let leftover = name.contains(".part-Frag") || name.ends_with(".ytdl");
            if name.starts_with(&prefix) && !leftover && is_non_empty_file(&entry.path()).await {
                return Some(entry.path());
            }
        }
        None
    }
}

/// Whether `path` is a regular file with content
pub async fn is_non_empty_file(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata.is_file() && metadata.len() > 0,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to stat artifact");
            false
        }
    }
}

/// Acquisition of the requested slice into the intermediate file
pub fn acquisition(
    program: &Path,
    request: &StartRequest,
    paths: &JobPaths,
    config: &DownloadConfig,
) -> Invocation {
    let section = format!(
        "*{}-{}",
        format_duration(request.start_time),
        format_duration(request.end_time)
    );

    Invocation::new(program, "acquire", config.acquire_timeout)
        .args(["--newline", "--no-part", "--no-playlist", "--no-mtime"])
        .arg("--download-sections")
        .arg(section)
        .arg("--concurrent-fragments")
        .arg(config.concurrent_fragments.to_string())
        .arg("--merge-output-format")
        .arg(config.output_extension.as_str())
        .arg("-o")
        .arg(paths.intermediate.as_os_str())
        .arg("--")
        .arg(request.url.as_str())
}

/// Stream-copy remux of the intermediate file with normalized timestamps
pub fn remux(
    program: &Path,
    intermediate: &Path,
    paths: &JobPaths,
    config: &DownloadConfig,
) -> Invocation {
    Invocation::new(program, "remux", config.remux_timeout)
        .args(["-y", "-hide_banner", "-nostats", "-progress", "pipe:1", "-i"])
        .arg(intermediate.as_os_str())
        .args([
            "-map",
            "0",
            "-c",
            "copy",
            "-avoid_negative_ts",
            "make_zero",
            "-fflags",
            "+genpts",
            "-movflags",
            "+faststart",
        ])
        .arg(paths.output.as_os_str())
}
