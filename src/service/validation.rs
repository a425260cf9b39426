//! Start request validation and download file naming

use url::Url;

use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::types::StartRequest;

const MAX_FILENAME_STEM: usize = 120;

/// Check a start request; returns the file name the artifact will be served as
pub fn validate_request(request: &StartRequest, config: &DownloadConfig) -> Result<String> {
    let url = Url::parse(request.url.trim())
        .map_err(|e| Error::validation("url", format!("not a valid URL ({})", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::validation("url", "must use http or https"));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::validation("url", "must include a host"));
    }

    if !request.start_time.is_finite() || request.start_time < 0.0 {
        return Err(Error::validation("startTime", "must be a number >= 0"));
    }
    if !request.end_time.is_finite() || request.end_time <= request.start_time {
        return Err(Error::validation("endTime", "must be greater than startTime"));
    }
    if request.duration() > config.max_clip_seconds {
        return Err(Error::validation(
            "endTime",
            format!(
                "slice is longer than the allowed {} seconds",
                config.max_clip_seconds
            ),
        ));
    }

    if let Some(bitrate) = request.bitrate_hint {
        if !bitrate.is_finite() || bitrate <= 0.0 {
            return Err(Error::validation("bitrateHint", "must be a positive number"));
        }
    }

    Ok(download_filename(request, &config.output_extension))
}

/// File name offered to the client for the finished artifact
///
/// A client-supplied name is reduced to a safe base name; otherwise the name
/// is built from the slice bounds, e.g. `clip_65.5-125.mp4`.
pub fn download_filename(request: &StartRequest, extension: &str) -> String {
    let stem = request
        .filename
        .as_deref()
        .map(sanitize_stem)
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| format!("clip_{}-{}", request.start_time, request.end_time));

    format!("{}.{}", stem, extension)
}

fn sanitize_stem(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    // The delivered container decides the extension
    let stem = match base.rfind('.') {
        Some(dot) if dot > 0 => &base[..dot],
        _ => base,
    };

    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILENAME_STEM)
        .collect();

    cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace()).to_string()
}
