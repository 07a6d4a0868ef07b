//! Per-record download procedure.
//!
//! [`download`] drives one [`DownloadRecord`] through the retry state machine
//! and always returns an [`Outcome`]; errors never escape a worker.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::engine::ProgressSink;
use super::retry::{AttemptEvent, AttemptState, RetryPolicy, classify_error};
use super::{DownloadError, HttpClient, TransferEvent};
use crate::manifest::DownloadRecord;

/// Granularity at which backoff sleeps notice an interrupt.
const INTERRUPT_POLL: Duration = Duration::from_millis(100);

/// How a successful record ended up on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The file was fetched during this run.
    Downloaded {
        /// Final file size.
        bytes: u64,
        /// Attempts used, including the successful one.
        attempts: u32,
        /// True when the last attempt continued a partial file.
        resumed: bool,
    },
    /// A non-empty file was already at the destination; no request was made.
    AlreadyPresent,
}

/// Final result of processing one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The file is in place.
    Success(Completion),
    /// Every allowed attempt failed.
    Failed {
        /// Attempts made.
        attempts: u32,
        /// Display form of the last error.
        error: String,
    },
    /// The run was interrupted before this record finished.
    Cancelled {
        /// Attempts made before the interrupt.
        attempts: u32,
    },
}

impl Outcome {
    /// Returns true for any `Success` variant.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns true if the record exhausted its retries.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Returns true if the record was interrupted.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Number of HTTP attempts made for this record.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success(Completion::Downloaded { attempts, .. })
            | Self::Failed { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
            Self::Success(Completion::AlreadyPresent) => 0,
        }
    }

    /// Number of attempts beyond the first.
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.attempts().saturating_sub(1)
    }
}

/// Downloads one record into `output_dir`, retrying per `policy`.
///
/// - A non-empty file already at the destination short-circuits to
///   [`Completion::AlreadyPresent`] without any request.
/// - Each failed attempt is classified; retryable failures wait out the
///   backoff delay (or the server's Retry-After) before the next attempt.
/// - Setting `interrupted` lets the current attempt finish, then stops the
///   loop (or cuts a backoff sleep short) with [`Outcome::Cancelled`].
/// - Bytes are reported to `progress` as they are written.
#[instrument(
    skip(client, output_dir, policy, interrupted, progress),
    fields(filename = %record.filename, url = %record.url)
)]
pub async fn download(
    client: &HttpClient,
    record: &DownloadRecord,
    output_dir: &Path,
    policy: &RetryPolicy,
    resume: bool,
    interrupted: &AtomicBool,
    progress: &dyn ProgressSink,
) -> Outcome {
    let final_path = output_dir.join(&record.filename);

    match tokio::fs::metadata(&final_path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => {
            debug!(path = %final_path.display(), "file already present, skipping");
            return Outcome::Success(Completion::AlreadyPresent);
        }
        _ => {}
    }

    let mut state = policy.transition(AttemptState::Pending, AttemptEvent::Begin);
    let mut last_error: Option<DownloadError> = None;
    let mut attempts = 0u32;
    let on_progress = |event: TransferEvent| progress.transfer_progress(record, event);

    while let AttemptState::Attempting(attempt) = state {
        if interrupted.load(Ordering::SeqCst) {
            debug!(attempt, "interrupted before attempt");
            return Outcome::Cancelled { attempts };
        }

        attempts = attempt;
        debug!(attempt, max_attempts = policy.max_attempts(), "attempting download");

        match client
            .fetch_to_path_with_progress(&record.url, &final_path, resume, &on_progress)
            .await
        {
            Ok(fetched) => {
                state = policy.transition(state, AttemptEvent::Succeeded);
                debug_assert_eq!(state, AttemptState::Success);
                return Outcome::Success(Completion::Downloaded {
                    bytes: fetched.bytes,
                    attempts,
                    resumed: fetched.resumed,
                });
            }
            Err(e) => {
                let failure_type = classify_error(&e);
                state = policy.transition(state, AttemptEvent::Failed(failure_type));

                if let AttemptState::Attempting(next_attempt) = state {
                    let delay = policy.retry_delay(attempt, &e);
                    info!(
                        attempt = next_attempt,
                        max_attempts = policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        ?failure_type,
                        error = %e,
                        "retrying download"
                    );
                    if !sleep_unless_interrupted(delay, interrupted).await {
                        return Outcome::Cancelled { attempts };
                    }
                }
                last_error = Some(e);
            }
        }
    }

    let error = last_error.map_or_else(|| "no attempt was made".to_string(), |e| e.to_string());
    warn!(attempts, error = %error, "download failed after all attempts");
    Outcome::Failed { attempts, error }
}

/// Sleeps for `delay` in short slices; returns false if interrupted first.
async fn sleep_unless_interrupted(delay: Duration, interrupted: &AtomicBool) -> bool {
    let mut remaining = delay;
    while !remaining.is_zero() {
        if interrupted.load(Ordering::SeqCst) {
            return false;
        }
        let slice = remaining.min(INTERRUPT_POLL);
        tokio::time::sleep(slice).await;
        remaining = remaining.saturating_sub(slice);
    }
    !interrupted.load(Ordering::SeqCst)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;

    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, Request, Respond, ResponseTemplate};

    use super::*;
    use crate::download::NoProgress;
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1), Duration::from_millis(5))
            .with_jitter(Duration::ZERO)
    }

    /// Fails the first `failures` requests with a 503, then serves `body`.
    struct FlakyResponder {
        calls: Arc<AtomicU32>,
        failures: u32,
        body: &'static [u8],
    }

    impl Respond for FlakyResponder {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                ResponseTemplate::new(503)
            } else {
                ResponseTemplate::new(200).set_body_bytes(self.body)
            }
        }
    }

    #[test]
    fn test_outcome_attempt_counts() {
        let downloaded = Outcome::Success(Completion::Downloaded {
            bytes: 3,
            attempts: 3,
            resumed: false,
        });
        assert_eq!(downloaded.attempts(), 3);
        assert_eq!(downloaded.retries(), 2);
        assert!(downloaded.is_success());

        let present = Outcome::Success(Completion::AlreadyPresent);
        assert_eq!(present.attempts(), 0);
        assert_eq!(present.retries(), 0);

        let failed = Outcome::Failed {
            attempts: 1,
            error: "boom".to_string(),
        };
        assert!(failed.is_failed());
        assert_eq!(failed.retries(), 0);

        assert!(Outcome::Cancelled { attempts: 0 }.is_cancelled());
    }

    #[tokio::test]
    async fn test_download_existing_file_makes_no_request() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"new".to_vec()))
            .expect(0)
            .mount(&mock_server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.tar"), b"old").unwrap();
        let record = DownloadRecord::new("a.tar", format!("{}/a", mock_server.uri()));

        let outcome = download(
            &HttpClient::new(),
            &record,
            temp_dir.path(),
            &fast_policy(3),
            true,
            &AtomicBool::new(false),
            &NoProgress,
        )
        .await;

        assert_eq!(outcome, Outcome::Success(Completion::AlreadyPresent));
        assert_eq!(std::fs::read(temp_dir.path().join("a.tar")).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_download_empty_existing_file_is_refetched() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fresh".to_vec()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.tar"), b"").unwrap();
        let record = DownloadRecord::new("a.tar", format!("{}/a", mock_server.uri()));

        let outcome = download(
            &HttpClient::new(),
            &record,
            temp_dir.path(),
            &fast_policy(0),
            true,
            &AtomicBool::new(false),
            &NoProgress,
        )
        .await;

        assert!(outcome.is_success());
        assert_eq!(std::fs::read(temp_dir.path().join("a.tar")).unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn test_download_fails_twice_then_succeeds() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let calls = Arc::new(AtomicU32::new(0));
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(FlakyResponder {
                calls: Arc::clone(&calls),
                failures: 2,
                body: b"payload",
            })
            .mount(&mock_server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let record = DownloadRecord::new("flaky.bin", format!("{}/flaky", mock_server.uri()));

        let outcome = download(
            &HttpClient::new(),
            &record,
            temp_dir.path(),
            &fast_policy(3),
            true,
            &AtomicBool::new(false),
            &NoProgress,
        )
        .await;

        assert_eq!(
            outcome,
            Outcome::Success(Completion::Downloaded {
                bytes: 7,
                attempts: 3,
                resumed: false,
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            std::fs::read(temp_dir.path().join("flaky.bin")).unwrap(),
            b"payload"
        );
    }

    #[derive(Default)]
    struct ByteCounter {
        starts: AtomicU32,
        bytes: std::sync::atomic::AtomicU64,
    }

    impl ProgressSink for ByteCounter {
        fn transfer_progress(&self, record: &DownloadRecord, event: TransferEvent) {
            assert_eq!(record.filename, "flaky.bin");
            match event {
                TransferEvent::Started { offset, .. } => {
                    assert_eq!(offset, 0);
                    self.starts.fetch_add(1, Ordering::SeqCst);
                }
                TransferEvent::Received(n) => {
                    self.bytes.fetch_add(n, Ordering::SeqCst);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_download_reports_bytes_to_progress() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(FlakyResponder {
                calls: Arc::new(AtomicU32::new(0)),
                failures: 1,
                body: b"payload",
            })
            .mount(&mock_server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let record = DownloadRecord::new("flaky.bin", format!("{}/flaky", mock_server.uri()));
        let counter = ByteCounter::default();

        let outcome = download(
            &HttpClient::new(),
            &record,
            temp_dir.path(),
            &fast_policy(3),
            true,
            &AtomicBool::new(false),
            &counter,
        )
        .await;

        assert!(outcome.is_success());
        // The 503 attempt never reaches the body.
        assert_eq!(counter.starts.load(Ordering::SeqCst), 1);
        assert_eq!(counter.bytes.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn test_download_exhausts_retries() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(3)
            .mount(&mock_server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let record = DownloadRecord::new("gone.bin", format!("{}/gone", mock_server.uri()));

        let outcome = download(
            &HttpClient::new(),
            &record,
            temp_dir.path(),
            &fast_policy(2),
            true,
            &AtomicBool::new(false),
            &NoProgress,
        )
        .await;

        let Outcome::Failed { attempts, error } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(attempts, 3);
        assert!(error.contains("404"), "error was: {error}");
        assert!(!temp_dir.path().join("gone.bin").exists());
    }

    #[tokio::test]
    async fn test_download_invalid_url_is_not_retried() {
        let temp_dir = TempDir::new().unwrap();
        let record = DownloadRecord::new("x.bin", "not a url");

        let outcome = download(
            &HttpClient::new(),
            &record,
            temp_dir.path(),
            &fast_policy(5),
            true,
            &AtomicBool::new(false),
            &NoProgress,
        )
        .await;

        assert_eq!(outcome.attempts(), 1);
        assert!(outcome.is_failed());
    }

    #[tokio::test]
    async fn test_download_interrupted_before_start_is_cancelled() {
        let temp_dir = TempDir::new().unwrap();
        let record = DownloadRecord::new("x.bin", "http://127.0.0.1:9/x");

        let outcome = download(
            &HttpClient::new(),
            &record,
            temp_dir.path(),
            &fast_policy(5),
            true,
            &AtomicBool::new(true),
            &NoProgress,
        )
        .await;

        assert_eq!(outcome, Outcome::Cancelled { attempts: 0 });
    }

    #[tokio::test]
    async fn test_sleep_unless_interrupted() {
        assert!(sleep_unless_interrupted(Duration::from_millis(5), &AtomicBool::new(false)).await);
        assert!(!sleep_unless_interrupted(Duration::from_secs(60), &AtomicBool::new(true)).await);
    }
}
