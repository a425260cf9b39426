//! Removal of job artifacts
//!
//! Every file a job creates lives directly in the temp directory and is named
//! `<jobId>.<suffix>`, so a job's files can always be found from its id alone.
//! Failures to delete are logged and never propagated.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::types::JobId;

/// Delete one file; a missing file counts as success
pub async fn remove_file_logged(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "removed artifact");
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove artifact");
            false
        }
    }
}

/// Files in `temp_dir` that belong to `id`
pub async fn job_files(temp_dir: &Path, id: &JobId) -> Vec<PathBuf> {
    let prefix = format!("{}.", id);
    let mut files = Vec::new();

    let mut entries = match tokio::fs::read_dir(temp_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return files,
        Err(e) => {
            warn!(dir = %temp_dir.display(), error = %e, "failed to list temp directory");
            return files;
        }
    };

    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                if entry.file_name().to_string_lossy().starts_with(&prefix) {
                    files.push(entry.path());
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(dir = %temp_dir.display(), error = %e, "failed to read temp directory entry");
                break;
            }
        }
    }

    files
}

/// Delete every file of `id`; returns how many were removed
pub async fn remove_job_files(temp_dir: &Path, id: &JobId) -> usize {
    let mut removed = 0;
    for path in job_files(temp_dir, id).await {
        if remove_file_logged(&path).await {
            removed += 1;
        }
    }
    if removed > 0 {
        debug!(job_id = %id, removed, "job artifacts removed");
    }
    removed
}
