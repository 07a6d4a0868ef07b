//! Manifest Downloader Library
//!
//! This library provides the core functionality for the manifest downloader,
//! which fetches every file listed in a tab-separated manifest into a local
//! directory using a fixed pool of concurrent workers.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`manifest`] - Manifest parsing and the retry-set filter
//! - [`download`] - HTTP client, per-record worker, retry policy and the dispatch engine
//! - [`failure_log`] - Append-only log of filenames that exhausted their retries
//! - [`config`] - Validated run configuration
//! - [`report`] - Serializable run summary

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub mod failure_log;
pub mod manifest;
pub mod report;
#[cfg(test)]
pub mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, RunConfig};
pub use download::{
    AttemptEvent, AttemptState, Completion, DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES,
    DownloadEngine, DownloadError, DownloadStats, EngineError, FailureType, HttpClient,
    NoProgress, Outcome, ProgressSink, RetryPolicy, RunReport, TransferEvent, classify_error,
    download,
};
pub use failure_log::{FailureLogError, read_failure_log, record_failures};
pub use manifest::{
    DownloadRecord, MalformedLine, Manifest, ManifestError, RetrySet, apply_filter,
    load_manifest, load_retry_set, parse_manifest,
};
pub use report::{FailureEntry, RunSummary};
