//! Retry state machine with exponential backoff for failed transfers.
//!
//! Each record moves through [`AttemptState`]: `Pending` → `Attempting(1)` →
//! ... → `Success` or `Failed`. [`RetryPolicy::transition`] is a pure
//! function over that state, so the retry rules are testable without any
//! network. The worker performs the side effects (fetch, sleep) between
//! transitions.
//!
//! # Example
//!
//! ```
//! use manifest_downloader::download::{AttemptEvent, AttemptState, FailureType, RetryPolicy};
//!
//! let policy = RetryPolicy::with_max_retries(1);
//! let state = policy.transition(AttemptState::Pending, AttemptEvent::Begin);
//! assert_eq!(state, AttemptState::Attempting(1));
//!
//! let state = policy.transition(state, AttemptEvent::Failed(FailureType::Transient));
//! assert_eq!(state, AttemptState::Attempting(2));
//!
//! let state = policy.transition(state, AttemptEvent::Failed(FailureType::Transient));
//! assert_eq!(state, AttemptState::Failed);
//! ```

use std::time::{Duration, SystemTime};

use rand::Rng;
use tracing::{debug, instrument, warn};

use super::DownloadError;
use super::constants::MAX_RETRY_AFTER;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Default base delay for exponential backoff (500 milliseconds).
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Default maximum delay cap (32 seconds).
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Default maximum jitter added to delays (500ms).
const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(500);

/// Classification of download failure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Network error, timeout, non-2xx status, short body or disk error.
    Transient,

    /// Server rate limiting (HTTP 429); honours Retry-After when present.
    RateLimited,

    /// Nothing a retry could fix (malformed URL).
    Permanent,
}

/// Where a record is in its retry lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    /// Not started yet.
    Pending,
    /// Attempt number `n` (1-based) is due or running.
    Attempting(u32),
    /// The file is in place.
    Success,
    /// Retries are exhausted or the failure is permanent.
    Failed,
}

impl AttemptState {
    /// Returns true for `Success` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// Input to [`RetryPolicy::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptEvent {
    /// Start processing a pending record.
    Begin,
    /// The current attempt completed the file.
    Succeeded,
    /// The current attempt failed.
    Failed(FailureType),
}

/// Configuration for retry behavior with exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: 10 (so up to 11 attempts)
/// - `base_delay`: 500 milliseconds
/// - `max_delay`: 32 seconds
/// - `max_jitter`: 500 milliseconds
///
/// # Delay Calculation
///
/// ```text
/// delay = min(base_delay * 2^(attempt - 1), max_delay) + jitter
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    max_retries: u32,

    /// Base delay for the first retry.
    base_delay: Duration,

    /// Maximum delay cap.
    max_delay: Duration,

    /// Multiplier applied each attempt.
    backoff_multiplier: f64,

    /// Upper bound of the random jitter added to each delay.
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings and default jitter.
    ///
    /// # Arguments
    ///
    /// * `max_retries` - Retries after the first attempt (0 means a single attempt)
    /// * `base_delay` - Delay before the first retry
    /// * `max_delay` - Maximum delay cap
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: max_delay.max(base_delay),
            ..Self::default()
        }
    }

    /// Creates a policy with a custom `max_retries`, using defaults for other settings.
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Replaces the jitter bound; `Duration::ZERO` makes delays deterministic.
    #[must_use]
    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Returns the number of retries after the first attempt.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the maximum number of attempts, including the first one.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Computes the next state of a record.
    ///
    /// Invalid combinations (such as `Succeeded` while `Pending`) and any
    /// event on a terminal state leave the state unchanged.
    #[must_use]
    pub fn transition(&self, state: AttemptState, event: AttemptEvent) -> AttemptState {
        match (state, event) {
            (AttemptState::Pending, AttemptEvent::Begin) => AttemptState::Attempting(1),
            (AttemptState::Attempting(_), AttemptEvent::Succeeded) => AttemptState::Success,
            (AttemptState::Attempting(_), AttemptEvent::Failed(FailureType::Permanent)) => {
                AttemptState::Failed
            }
            (AttemptState::Attempting(n), AttemptEvent::Failed(_)) => {
                if n <= self.max_retries {
                    AttemptState::Attempting(n + 1)
                } else {
                    AttemptState::Failed
                }
            }
            (state, _) => state,
        }
    }

    /// Returns how long to wait after attempt `failed_attempt` (1-based) failed with `error`.
    ///
    /// A 429 carrying a parseable Retry-After uses the server's delay;
    /// everything else uses exponential backoff with jitter.
    #[instrument(skip(self, error), fields(max_retries = self.max_retries))]
    pub fn retry_delay(&self, failed_attempt: u32, error: &DownloadError) -> Duration {
        if let DownloadError::HttpStatus {
            status: 429,
            retry_after: Some(value),
            ..
        } = error
            && let Some(delay) = parse_retry_after(value)
        {
            debug!(retry_after = %value, delay_ms = delay.as_millis(), "using Retry-After delay");
            return delay;
        }
        self.calculate_delay(failed_attempt)
    }

    /// Calculates the delay for a retry attempt with exponential backoff and jitter.
    ///
    /// Formula: `min(base_delay * multiplier^(attempt - 1), max_delay) + jitter`
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay_ms = base_ms * self.backoff_multiplier.powi(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped_ms as u64) + self.calculate_jitter()
    }

    /// Generates random jitter between 0 and `max_jitter`.
    ///
    /// Spreads out workers whose requests failed together.
    #[allow(clippy::cast_possible_truncation)]
    fn calculate_jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Classifies a download error into a failure type for retry decisions.
///
/// Any network error, timeout, non-2xx status, short body or disk error is
/// retried. Only a malformed URL is permanent.
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status: 429, .. } => FailureType::RateLimited,
        DownloadError::InvalidUrl { .. } => FailureType::Permanent,
        DownloadError::HttpStatus { .. }
        | DownloadError::Network { .. }
        | DownloadError::Timeout { .. }
        | DownloadError::RangeNotSatisfiable { .. }
        | DownloadError::UnexpectedRange { .. }
        | DownloadError::Incomplete { .. }
        | DownloadError::Io { .. } => FailureType::Transient,
    }
}

/// Parses a Retry-After header value (delta-seconds or HTTP-date).
///
/// Values above one hour are capped. Negative numbers, dates in the past and
/// garbage yield `None`.
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<u64>() {
        return Some(cap_retry_after(Duration::from_secs(seconds)));
    }

    if let Ok(datetime) = httpdate::parse_http_date(header_value) {
        return datetime
            .duration_since(SystemTime::now())
            .ok()
            .map(cap_retry_after);
    }

    debug!(header_value, "unparseable Retry-After value, ignoring");
    None
}

fn cap_retry_after(delay: Duration) -> Duration {
    if delay > MAX_RETRY_AFTER {
        warn!(
            delay_secs = delay.as_secs(),
            max_secs = MAX_RETRY_AFTER.as_secs(),
            "Retry-After exceeds maximum, capping at 1 hour"
        );
        MAX_RETRY_AFTER
    } else {
        delay
    }
}
