//! JSON run summary for scripting.

use std::path::Path;

use serde::Serialize;

use crate::download::{Completion, Outcome, RunReport};

/// Serializable digest of a [`RunReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Records handed to the engine.
    pub total: usize,
    /// Files fetched during this run.
    pub downloaded: usize,
    /// Records skipped because the file already existed.
    pub already_present: usize,
    /// Records that exhausted their retries.
    pub failed: usize,
    /// Records cut short by an interrupt.
    pub cancelled: usize,
    /// Retry attempts across all records.
    pub retried: usize,
    /// Bytes written by successful downloads.
    pub bytes_downloaded: u64,
    /// True if the run was interrupted.
    pub interrupted: bool,
    /// Per-record failure details, in dispatch order.
    pub failures: Vec<FailureEntry>,
}

/// One failed record in a [`RunSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureEntry {
    /// Target filename.
    pub filename: String,
    /// Source URL.
    pub url: String,
    /// Attempts made.
    pub attempts: u32,
    /// Last error message.
    pub error: String,
}

impl From<&RunReport> for RunSummary {
    fn from(report: &RunReport) -> Self {
        let bytes_downloaded = report
            .outcomes
            .iter()
            .map(|(_, outcome)| match outcome {
                Outcome::Success(Completion::Downloaded { bytes, .. }) => *bytes,
                _ => 0,
            })
            .sum();

        let failures = report
            .outcomes
            .iter()
            .filter_map(|(record, outcome)| match outcome {
                Outcome::Failed { attempts, error } => Some(FailureEntry {
                    filename: record.filename.clone(),
                    url: record.url.clone(),
                    attempts: *attempts,
                    error: error.clone(),
                }),
                _ => None,
            })
            .collect();

        Self {
            total: report.outcomes.len(),
            downloaded: report.stats.downloaded(),
            already_present: report.stats.already_present(),
            failed: report.stats.failed(),
            cancelled: report.stats.cancelled(),
            retried: report.stats.retried(),
            bytes_downloaded,
            interrupted: report.was_interrupted(),
            failures,
        }
    }
}

impl RunSummary {
    /// Writes the summary as pretty-printed JSON to `path`.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be written.
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json + "\n")
    }
}
