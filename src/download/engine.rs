//! Download engine for concurrent manifest downloads with retry support.
//!
//! This module provides the [`DownloadEngine`] which fans a list of
//! [`DownloadRecord`]s out to a fixed number of concurrent workers using a
//! semaphore, and collects one [`Outcome`] per record.
//!
//! # Example
//!
//! ```no_run
//! use manifest_downloader::download::{DownloadEngine, HttpClient, NoProgress, RetryPolicy};
//! use manifest_downloader::manifest::DownloadRecord;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(10, RetryPolicy::default())?;
//! let records = vec![DownloadRecord::new("a.tar", "https://example.com/a.tar")];
//! let report = engine
//!     .run(records, &HttpClient::new(), Path::new("./raw"), Arc::new(NoProgress))
//!     .await?;
//! println!("Downloaded: {}, Failed: {}", report.stats.downloaded(), report.stats.failed());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::retry::RetryPolicy;
use super::{HttpClient, TransferEvent};
use super::worker::{Completion, Outcome, download};
use crate::manifest::DownloadRecord;

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Error type for download engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The output directory could not be created.
    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        /// Directory that was requested.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Statistics from a download run.
///
/// Uses atomic counters so concurrent workers can update them and progress
/// reporters can read them while the run is in flight.
#[derive(Debug, Default)]
pub struct DownloadStats {
    downloaded: AtomicUsize,
    already_present: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
    retried: AtomicUsize,
}

impl DownloadStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of files fetched during this run.
    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.downloaded.load(Ordering::SeqCst)
    }

    /// Returns the number of records skipped because the file already existed.
    #[must_use]
    pub fn already_present(&self) -> usize {
        self.already_present.load(Ordering::SeqCst)
    }

    /// Returns the number of successful records (downloaded + already present).
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.downloaded() + self.already_present()
    }

    /// Returns the number of records that exhausted their retries.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Returns the number of records cut short by an interrupt.
    #[must_use]
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the total number of records with an outcome.
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded() + self.failed() + self.cancelled()
    }

    /// Returns the number of retry attempts made across all records.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    fn record(&self, outcome: &Outcome) {
        match outcome {
            Outcome::Success(Completion::Downloaded { .. }) => {
                self.downloaded.fetch_add(1, Ordering::SeqCst);
            }
            Outcome::Success(Completion::AlreadyPresent) => {
                self.already_present.fetch_add(1, Ordering::SeqCst);
            }
            Outcome::Failed { .. } => {
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
            Outcome::Cancelled { .. } => {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.retried.fetch_add(outcome.retries() as usize, Ordering::SeqCst);
    }
}

/// Observer for run progress.
///
/// Every method has an empty default so implementors only override what
/// they display. Calls arrive from worker tasks, so implementations must be
/// cheap and thread-safe.
pub trait ProgressSink: Send + Sync {
    /// The engine is about to dispatch `total` records.
    fn run_started(&self, _total: usize) {}

    /// A worker picked up `record`.
    fn record_started(&self, _record: &DownloadRecord) {}

    /// Byte-level progress of the current attempt for `record`.
    ///
    /// A retry starts over with a fresh [`TransferEvent::Started`].
    fn transfer_progress(&self, _record: &DownloadRecord, _event: TransferEvent) {}

    /// `record` reached its final outcome; `stats` already include it.
    ///
    /// Called exactly once per record, including records cancelled before
    /// they were dispatched.
    fn record_finished(
        &self,
        _record: &DownloadRecord,
        _outcome: &Outcome,
        _stats: &DownloadStats,
    ) {
    }

    /// All workers have finished.
    fn run_finished(&self, _stats: &DownloadStats) {}
}

/// A [`ProgressSink`] that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {}

/// Result of a [`DownloadEngine::run`] call.
#[derive(Debug)]
pub struct RunReport {
    /// One entry per input record, in dispatch order.
    pub outcomes: Vec<(DownloadRecord, Outcome)>,
    /// Aggregate counters.
    pub stats: DownloadStats,
}

impl RunReport {
    /// Returns the filenames of records that exhausted their retries, in dispatch order.
    #[must_use]
    pub fn failed_filenames(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_failed())
            .map(|(record, _)| record.filename.as_str())
            .collect()
    }

    /// Returns true if any record was cut short by an interrupt.
    #[must_use]
    pub fn was_interrupted(&self) -> bool {
        self.stats.cancelled() > 0
    }
}

/// Download engine for concurrent file downloads with retry support.
///
/// # Concurrency Model
///
/// - Each record runs in its own Tokio task
/// - A semaphore permit is acquired before starting each record
/// - Permits are released automatically when a record completes (RAII)
/// - Records are dispatched in input order; completion order is arbitrary
///
/// # Interruption
///
/// Once the interrupt flag is set no further records are dispatched. The
/// remaining records are reported as cancelled and in-flight workers stop
/// after their current attempt.
#[derive(Debug)]
pub struct DownloadEngine {
    /// Semaphore for concurrency control.
    semaphore: Arc<Semaphore>,
    /// Configured concurrency limit.
    concurrency: usize,
    /// Retry policy for failed downloads.
    retry_policy: RetryPolicy,
    /// Continue `.part` files with Range requests.
    resume: bool,
    /// Set externally (Ctrl-C) to stop the run.
    interrupted: Arc<AtomicBool>,
}

impl DownloadEngine {
    /// Creates a new download engine with the specified concurrency limit and retry policy.
    ///
    /// # Arguments
    ///
    /// * `concurrency` - Maximum number of concurrent downloads (1-100)
    /// * `retry_policy` - Policy for retrying failed downloads
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside
    /// the valid range (1-100).
    ///
    /// # Example
    ///
    /// ```
    /// use manifest_downloader::download::{DownloadEngine, RetryPolicy};
    ///
    /// let engine = DownloadEngine::new(10, RetryPolicy::default()).unwrap();
    /// assert_eq!(engine.concurrency(), 10);
    /// ```
    #[instrument(level = "debug", skip(retry_policy))]
    pub fn new(concurrency: usize, retry_policy: RetryPolicy) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        debug!(
            concurrency,
            max_retries = retry_policy.max_retries(),
            "creating download engine"
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            retry_policy,
            resume: true,
            interrupted: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Enables or disables resuming `.part` files (enabled by default).
    #[must_use]
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    /// Shares an interrupt flag with the caller.
    #[must_use]
    pub fn with_interrupt_flag(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = interrupted;
        self
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Downloads every record into `output_dir` and waits for all of them.
    ///
    /// Individual download failures do NOT cause this method to error; they
    /// appear as [`Outcome::Failed`] entries in the report. A worker task
    /// that panics is reported as failed too.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::OutputDir`] if `output_dir` cannot be created.
    #[instrument(
        skip(self, records, client, progress),
        fields(records = records.len(), output_dir = %output_dir.display())
    )]
    pub async fn run(
        &self,
        records: Vec<DownloadRecord>,
        client: &HttpClient,
        output_dir: &Path,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<RunReport, EngineError> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| EngineError::OutputDir {
                path: output_dir.to_path_buf(),
                source,
            })?;

        let stats = Arc::new(DownloadStats::new());
        let mut pending = Vec::with_capacity(records.len());
        let mut skipped = Vec::new();

        info!(concurrency = self.concurrency, "starting download run");
        progress.run_started(records.len());

        let mut records = records.into_iter();
        for record in records.by_ref() {
            // Acquire semaphore permit (blocks if at concurrency limit).
            // The engine never closes its semaphore.
            let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
                skipped.push(record);
                break;
            };

            if self.interrupted.load(Ordering::SeqCst) {
                info!("interrupt received, no further records will be dispatched");
                skipped.push(record);
                break;
            }

            let client = client.clone();
            let stats = Arc::clone(&stats);
            let progress = Arc::clone(&progress);
            let output_dir = output_dir.to_path_buf();
            let retry_policy = self.retry_policy.clone();
            let interrupted = Arc::clone(&self.interrupted);
            let resume = self.resume;
            let task_record = record.clone();

            let handle = tokio::spawn(async move {
                // Permit is dropped when this block exits (RAII)
                let _permit = permit;
                progress.record_started(&task_record);

                let outcome = download(
                    &client,
                    &task_record,
                    &output_dir,
                    &retry_policy,
                    resume,
                    &interrupted,
                    progress.as_ref(),
                )
                .await;

                stats.record(&outcome);
                progress.record_finished(&task_record, &outcome, &stats);
                outcome
            });
            pending.push((record, handle));
        }
        skipped.extend(records);

        debug!(task_count = pending.len(), "waiting for downloads to complete");

        let mut outcomes = Vec::with_capacity(pending.len() + skipped.len());
        for (record, handle) in pending {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(filename = %record.filename, error = %e, "download task panicked");
                    let outcome = Outcome::Failed {
                        attempts: 0,
                        error: format!("worker task failed: {e}"),
                    };
                    stats.record(&outcome);
                    progress.record_finished(&record, &outcome, &stats);
                    outcome
                }
            };
            outcomes.push((record, outcome));
        }

        for record in skipped {
            let outcome = Outcome::Cancelled { attempts: 0 };
            stats.record(&outcome);
            progress.record_finished(&record, &outcome, &stats);
            outcomes.push((record, outcome));
        }

        info!(
            downloaded = stats.downloaded(),
            already_present = stats.already_present(),
            failed = stats.failed(),
            cancelled = stats.cancelled(),
            retried = stats.retried(),
            "download run complete"
        );
        progress.run_finished(&stats);

        // All tasks are joined, so this is the last reference.
        let stats = Arc::try_unwrap(stats).unwrap_or_else(|shared| DownloadStats {
            downloaded: AtomicUsize::new(shared.downloaded()),
            already_present: AtomicUsize::new(shared.already_present()),
            failed: AtomicUsize::new(shared.failed()),
            cancelled: AtomicUsize::new(shared.cancelled()),
            retried: AtomicUsize::new(shared.retried()),
        });

        Ok(RunReport { outcomes, stats })
    }
}
