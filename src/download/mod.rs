//! Concurrent HTTP downloads of manifest records.
//!
//! This module streams each record's URL to `<output>/<filename>` through a
//! temporary `.part` file, retries failures with exponential backoff and
//! runs a bounded number of records at once.
//!
//! # Features
//!
//! - Streaming downloads (memory-efficient for large files) with per-chunk
//!   progress callbacks
//! - Atomic placement: a final file only appears once complete
//! - Range-based resume of interrupted `.part` files
//! - Configurable timeouts (30s connect, 5min read by default)
//! - Retry state machine honoring Retry-After on 429
//!
//! # Example
//!
//! ```no_run
//! use manifest_downloader::download::{HttpClient, NoProgress, RetryPolicy, download};
//! use manifest_downloader::manifest::DownloadRecord;
//! use std::path::Path;
//! use std::sync::atomic::AtomicBool;
//!
//! # async fn example() {
//! let record = DownloadRecord::new("a.tar", "https://example.com/a.tar");
//! let outcome = download(
//!     &HttpClient::new(),
//!     &record,
//!     Path::new("./raw"),
//!     &RetryPolicy::default(),
//!     true,
//!     &AtomicBool::new(false),
//!     &NoProgress,
//! )
//! .await;
//! println!("{outcome:?}");
//! # }
//! ```

mod client;
mod constants;
mod engine;
mod error;
mod retry;
mod worker;

pub use client::{FetchResult, HttpClient, TransferEvent, part_path_for};
pub use constants::{CONNECT_TIMEOUT_SECS, PART_SUFFIX, READ_TIMEOUT_SECS};
pub use engine::{
    DEFAULT_CONCURRENCY, DownloadEngine, DownloadStats, EngineError, NoProgress, ProgressSink,
    RunReport,
};
pub use error::DownloadError;
pub use retry::{
    AttemptEvent, AttemptState, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES,
    FailureType, RetryPolicy, classify_error, parse_retry_after,
};
pub use worker::{Completion, Outcome, download};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
