//! Configuration types for slice-dl

use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use utoipa::ToSchema;

use crate::error::{Error, Result};

/// Job execution configuration (temp storage, phase budgets, acquisition tuning)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DownloadConfig {
    /// Directory for intermediate and output artifacts (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Concurrency hint passed to the acquisition tool (default: 4 fragments)
    #[serde(default = "default_concurrent_fragments")]
    pub concurrent_fragments: u32,

    /// Wall-clock budget for the acquisition phase (default: 10 minutes)
    #[serde(default = "default_acquire_timeout", with = "duration_serde")]
    pub acquire_timeout: Duration,

    /// Wall-clock budget for the remux phase (default: 60 seconds)
    #[serde(default = "default_remux_timeout", with = "duration_serde")]
    pub remux_timeout: Duration,

    /// How often the partial file size is sampled when estimating by bytes (default: 500ms)
    #[serde(default = "default_byte_poll_interval", with = "duration_ms_serde")]
    pub byte_poll_interval: Duration,

    /// Container extension of the delivered artifact (default: "mp4")
    #[serde(default = "default_output_extension")]
    pub output_extension: String,

    /// Longest slice a client may request, in seconds (default: 3600)
    #[serde(default = "default_max_clip_seconds")]
    pub max_clip_seconds: f64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            concurrent_fragments: default_concurrent_fragments(),
            acquire_timeout: default_acquire_timeout(),
            remux_timeout: default_remux_timeout(),
            byte_poll_interval: default_byte_poll_interval(),
            output_extension: default_output_extension(),
            max_clip_seconds: default_max_clip_seconds(),
        }
    }
}

/// External tool paths
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ToolsConfig {
    /// Path to yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub yt_dlp_path: Option<PathBuf>,

    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: None,
            ffmpeg_path: None,
            search_path: true,
        }
    }
}

/// Progress estimation tuning
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ProgressConfig {
    /// Initial guess for the duration of one streamed segment in seconds (default: 6.0)
    #[serde(default = "default_segment_seconds")]
    pub default_segment_seconds: f64,

    /// Weight of each new raw estimate, in (0, 1]; 1.0 disables smoothing (default: 1.0)
    #[serde(default = "default_smoothing_factor")]
    pub smoothing_factor: f64,

    /// Segment gaps shorter than this multiple of the running average are outliers (default: 0.25)
    #[serde(default = "default_plausible_min_ratio")]
    pub plausible_min_ratio: f64,

    /// Segment gaps longer than this multiple of the running average are outliers (default: 4.0)
    #[serde(default = "default_plausible_max_ratio")]
    pub plausible_max_ratio: f64,

    /// Largest jump, in percentage points, a single segment may cause (default: 25.0)
    #[serde(default = "default_max_step")]
    pub max_step: f64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            default_segment_seconds: default_segment_seconds(),
            smoothing_factor: default_smoothing_factor(),
            plausible_min_ratio: default_plausible_min_ratio(),
            plausible_max_ratio: default_plausible_max_ratio(),
            max_step: default_max_step(),
        }
    }
}

/// Retention of finished jobs that nobody collected
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetentionConfig {
    /// Terminal jobs older than this are removed with their files (default: 1 hour)
    #[serde(default = "default_job_ttl", with = "duration_serde")]
    pub job_ttl: Duration,

    /// How often the reaper looks for expired jobs (default: 60 seconds)
    #[serde(default = "default_sweep_interval", with = "duration_serde")]
    pub sweep_interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            job_ttl: default_job_ttl(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

/// Main configuration for SliceDownloader
///
/// Fields are organized into logical sub-configs:
/// - [`download`](DownloadConfig): temp storage, phase budgets, acquisition tuning
/// - [`tools`](ToolsConfig): external binary paths
/// - [`progress`](ProgressConfig): estimator tuning
/// - [`retention`](RetentionConfig): expiry of uncollected jobs
/// - [`server`](ServerIntegrationConfig): REST API
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Job execution settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// External tool paths
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Progress estimation tuning
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Retention of finished jobs
    #[serde(default)]
    pub retention: RetentionConfig,

    /// API and external server integration
    #[serde(default)]
    pub server: ServerIntegrationConfig,
}

impl Config {
    /// Temporary directory
    pub fn temp_dir(&self) -> &PathBuf {
        &self.download.temp_dir
    }

    /// Check invariants that serde defaults cannot express
    pub fn validate(&self) -> Result<()> {
        if self.download.acquire_timeout.is_zero() {
            return Err(config_error("acquire_timeout must be positive", "acquire_timeout"));
        }
        if self.download.remux_timeout.is_zero() {
            return Err(config_error("remux_timeout must be positive", "remux_timeout"));
        }
        if self.download.byte_poll_interval.is_zero() {
            return Err(config_error(
                "byte_poll_interval must be positive",
                "byte_poll_interval",
            ));
        }
        if self.download.concurrent_fragments == 0 {
            return Err(config_error(
                "concurrent_fragments must be at least 1",
                "concurrent_fragments",
            ));
        }
        if !(self.download.max_clip_seconds > 0.0) {
            return Err(config_error("max_clip_seconds must be positive", "max_clip_seconds"));
        }
        let extension = &self.download.output_extension;
        if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(config_error(
                "output_extension must be a plain alphanumeric extension",
                "output_extension",
            ));
        }

        let progress = &self.progress;
        if !(progress.default_segment_seconds > 0.0) {
            return Err(config_error(
                "default_segment_seconds must be positive",
                "default_segment_seconds",
            ));
        }
        if !(progress.smoothing_factor > 0.0 && progress.smoothing_factor <= 1.0) {
            return Err(config_error(
                "smoothing_factor must be in (0, 1]",
                "smoothing_factor",
            ));
        }
        if !(progress.plausible_min_ratio > 0.0
            && progress.plausible_min_ratio < 1.0
            && progress.plausible_max_ratio > 1.0)
        {
            return Err(config_error(
                "plausible ratios must satisfy 0 < min < 1 < max",
                "plausible_min_ratio",
            ));
        }
        if !(progress.max_step > 0.0) {
            return Err(config_error("max_step must be positive", "max_step"));
        }

        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

/// API and external server integration configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6790)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Optional API key for authentication
    #[serde(default)]
    pub api_key: Option<String>,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_key: None,
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

// Default value functions
fn default_temp_dir() -> PathBuf {
    PathBuf::from("temp")
}

fn default_concurrent_fragments() -> u32 {
    4
}

fn default_acquire_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_remux_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_byte_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_output_extension() -> String {
    "mp4".to_string()
}

fn default_max_clip_seconds() -> f64 {
    3600.0
}

fn default_true() -> bool {
    true
}

fn default_segment_seconds() -> f64 {
    6.0
}

fn default_smoothing_factor() -> f64 {
    1.0
}

fn default_plausible_min_ratio() -> f64 {
    0.25
}

fn default_plausible_max_ratio() -> f64 {
    4.0
}

fn default_max_step() -> f64 {
    25.0
}

fn default_job_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6790))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
