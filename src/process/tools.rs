//! Locating the external binaries

use std::path::PathBuf;

use crate::config::ToolsConfig;
use crate::error::{Error, Result};

/// External tools a job depends on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tool {
    /// Acquisition (yt-dlp)
    YtDlp,
    /// Remux (ffmpeg)
    Ffmpeg,
}

impl Tool {
    pub fn binary_name(self) -> &'static str {
        match self {
            Tool::YtDlp => "yt-dlp",
            Tool::Ffmpeg => "ffmpeg",
        }
    }
}

/// Resolves tool binaries from explicit config paths or from PATH
///
/// Resolution happens per job, so a tool installed while the service is
/// running is picked up by the next job.
#[derive(Clone, Debug)]
pub struct ToolLocator {
    config: ToolsConfig,
}

impl ToolLocator {
    pub fn new(config: ToolsConfig) -> Self {
        Self { config }
    }

    /// Path of `tool`, or [`Error::ToolMissing`]
    pub fn locate(&self, tool: Tool) -> Result<PathBuf> {
        let explicit = match tool {
            Tool::YtDlp => self.config.yt_dlp_path.as_ref(),
            Tool::Ffmpeg => self.config.ffmpeg_path.as_ref(),
        };

        if let Some(path) = explicit {
            if path.is_file() {
                return Ok(path.clone());
            }
            tracing::warn!(
                tool = tool.binary_name(),
                path = %path.display(),
                "configured tool path does not exist"
            );
            return Err(missing(tool));
        }

        if self.config.search_path {
            return which::which(tool.binary_name()).map_err(|_| missing(tool));
        }

        Err(missing(tool))
    }
}

fn missing(tool: Tool) -> Error {
    Error::ToolMissing {
        tool: tool.binary_name().to_string(),
    }
}
