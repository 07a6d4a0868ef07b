//! Validated settings for one download run.
//!
//! [`RunConfig`] gathers every knob the run needs in one place. The CLI
//! builds it from flags; library users can start from [`RunConfig::default`]
//! and override fields.

use std::path::PathBuf;
use std::time::Duration;

use crate::download::{
    CONNECT_TIMEOUT_SECS, DEFAULT_BASE_DELAY, DEFAULT_CONCURRENCY, DEFAULT_MAX_DELAY,
    DEFAULT_MAX_RETRIES, READ_TIMEOUT_SECS, RetryPolicy,
};

/// Default manifest path.
pub const DEFAULT_MANIFEST_PATH: &str = "download_links.tsv";

/// Default retry file path.
pub const DEFAULT_RETRY_PATH: &str = "retry.txt";

/// Default output directory.
pub const DEFAULT_OUTPUT_DIR: &str = "raw";

/// Default failure log path.
pub const DEFAULT_FAILURE_LOG_PATH: &str = "failed_downloads.txt";

/// Upper bound on retries per record.
pub const MAX_ALLOWED_RETRIES: u32 = 50;

/// Upper bound on worker count.
pub const MAX_WORKERS: usize = 100;

/// Invalid run configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Worker count outside `1..=100`.
    #[error("worker count {value} is out of range: must be between 1 and {MAX_WORKERS}")]
    WorkerCount {
        /// Rejected value.
        value: usize,
    },

    /// Retry count above the allowed maximum.
    #[error("max retries {value} is out of range: must be at most {MAX_ALLOWED_RETRIES}")]
    MaxRetries {
        /// Rejected value.
        value: u32,
    },

    /// A timeout of zero seconds.
    #[error("{name} must be at least 1 second")]
    ZeroTimeout {
        /// Which timeout.
        name: &'static str,
    },

    /// Backoff cap below the base delay.
    #[error("max backoff {max:?} is shorter than base backoff {base:?}")]
    BackoffRange {
        /// Base delay.
        base: Duration,
        /// Cap.
        max: Duration,
    },

    /// Empty `--require-suffix` value.
    #[error("required filename suffix must not be empty")]
    EmptySuffix,
}

/// Settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Manifest of `filename<TAB>url` lines.
    pub manifest_path: PathBuf,
    /// Optional retry file restricting the run.
    pub retry_path: PathBuf,
    /// Directory downloads are written to.
    pub output_dir: PathBuf,
    /// Append-only list of filenames that exhausted their retries.
    pub failure_log_path: PathBuf,
    /// Concurrent workers.
    pub worker_count: usize,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_backoff: Duration,
    /// Cap on a single backoff delay.
    pub max_backoff: Duration,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Idle read timeout in seconds.
    pub read_timeout_secs: u64,
    /// Only accept manifest filenames ending with this suffix.
    pub require_suffix: Option<String>,
    /// Continue existing `.part` files with Range requests.
    pub resume: bool,
    /// Where to write the JSON run summary, if anywhere.
    pub summary_json: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            manifest_path: PathBuf::from(DEFAULT_MANIFEST_PATH),
            retry_path: PathBuf::from(DEFAULT_RETRY_PATH),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            failure_log_path: PathBuf::from(DEFAULT_FAILURE_LOG_PATH),
            worker_count: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            base_backoff: DEFAULT_BASE_DELAY,
            max_backoff: DEFAULT_MAX_DELAY,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            require_suffix: None,
            resume: true,
            summary_json: None,
        }
    }
}

impl RunConfig {
    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_WORKERS).contains(&self.worker_count) {
            return Err(ConfigError::WorkerCount {
                value: self.worker_count,
            });
        }
        if self.max_retries > MAX_ALLOWED_RETRIES {
            return Err(ConfigError::MaxRetries {
                value: self.max_retries,
            });
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout {
                name: "connect timeout",
            });
        }
        if self.read_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout {
                name: "read timeout",
            });
        }
        if self.max_backoff < self.base_backoff {
            return Err(ConfigError::BackoffRange {
                base: self.base_backoff,
                max: self.max_backoff,
            });
        }
        if self.require_suffix.as_deref() == Some("") {
            return Err(ConfigError::EmptySuffix);
        }
        Ok(())
    }

    /// Builds the retry policy these settings describe.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.base_backoff, self.max_backoff)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.worker_count, 10);
        assert_eq!(config.max_retries, 10);
        assert_eq!(config.output_dir, PathBuf::from("raw"));
        assert_eq!(config.failure_log_path, PathBuf::from("failed_downloads.txt"));
        assert!(config.resume);
    }

    #[test]
    fn test_validate_worker_count_bounds() {
        let mut config = RunConfig {
            worker_count: 0,
            ..RunConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::WorkerCount { value: 0 }));

        config.worker_count = 101;
        assert_eq!(
            config.validate(),
            Err(ConfigError::WorkerCount { value: 101 })
        );

        config.worker_count = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_max_retries() {
        let config = RunConfig {
            max_retries: 51,
            ..RunConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::MaxRetries { value: 51 }));
    }

    #[test]
    fn test_validate_zero_timeouts() {
        let config = RunConfig {
            read_timeout_secs: 0,
            ..RunConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroTimeout { .. })
        ));
    }

    #[test]
    fn test_validate_backoff_range() {
        let config = RunConfig {
            base_backoff: Duration::from_secs(10),
            max_backoff: Duration::from_secs(1),
            ..RunConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BackoffRange { .. })
        ));
    }

    #[test]
    fn test_validate_empty_suffix() {
        let config = RunConfig {
            require_suffix: Some(String::new()),
            ..RunConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptySuffix));
    }

    #[test]
    fn test_retry_policy_uses_config_values() {
        let config = RunConfig {
            max_retries: 3,
            ..RunConfig::default()
        };
        assert_eq!(config.retry_policy().max_retries(), 3);
        assert_eq!(config.retry_policy().max_attempts(), 4);
    }

    #[test]
    fn test_config_error_display() {
        let msg = ConfigError::WorkerCount { value: 0 }.to_string();
        assert!(msg.contains("worker count 0"));
        assert!(msg.contains("100"));
    }
}
