//! Append-only log of filenames that exhausted their retries.
//!
//! After a run, every record whose outcome is [`Outcome::Failed`] is written
//! to the failure log as one filename per line. Earlier content is never
//! rewritten, so the file accumulates across runs and can be fed back as a
//! retry file. Cancelled records are not logged.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, info, instrument};

use crate::download::Outcome;
use crate::manifest::DownloadRecord;

/// Errors from reading or appending to the failure log.
#[derive(Debug, thiserror::Error)]
pub enum FailureLogError {
    /// Opening, locking or writing the log failed.
    #[error("cannot write failure log {path}: {source}")]
    Write {
        /// Log file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Reading the log failed.
    #[error("cannot read failure log {path}: {source}")]
    Read {
        /// Log file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl FailureLogError {
    fn write(path: &Path, source: std::io::Error) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Appends the filename of every failed outcome to `path`.
///
/// The file is created if absent. All lines go out in a single write under an
/// exclusive advisory lock, so concurrent runs sharing a log never
/// interleave partial lines. Nothing is opened when there are no failures.
///
/// Returns the number of lines appended.
///
/// # Errors
///
/// Returns [`FailureLogError::Write`] if the file cannot be opened, locked or written.
#[instrument(skip(outcomes), fields(path = %path.display()))]
pub fn record_failures(
    outcomes: &[(DownloadRecord, Outcome)],
    path: &Path,
) -> Result<usize, FailureLogError> {
    let failed: Vec<&str> = outcomes
        .iter()
        .filter(|(_, outcome)| outcome.is_failed())
        .map(|(record, _)| record.filename.as_str())
        .collect();

    if failed.is_empty() {
        debug!("no failures to record");
        return Ok(0);
    }

    let mut buffer = String::with_capacity(failed.iter().map(|name| name.len() + 1).sum());
    for name in &failed {
        buffer.push_str(name);
        buffer.push('\n');
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| FailureLogError::write(path, e))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| FailureLogError::write(path, e))?;

    file.lock_exclusive()
        .map_err(|e| FailureLogError::write(path, e))?;
    let written = file
        .write_all(buffer.as_bytes())
        .and_then(|()| file.flush());
    // Dropping the handle releases the lock too.
    let _ = FileExt::unlock(&file);
    written.map_err(|e| FailureLogError::write(path, e))?;

    info!(count = failed.len(), "recorded failed downloads");
    Ok(failed.len())
}

/// Reads the failure log back as a list of filenames (blank lines skipped).
///
/// A missing file yields an empty list.
///
/// # Errors
///
/// Returns [`FailureLogError::Read`] if the file exists but cannot be read.
pub fn read_failure_log(path: &Path) -> Result<Vec<String>, FailureLogError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(source) => Err(FailureLogError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}
