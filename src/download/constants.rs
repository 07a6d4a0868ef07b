//! Constants for the download module (timeouts, temporary files, Retry-After cap).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default read timeout: 5 minutes without receiving any data.
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Suffix of the temporary file an in-flight transfer writes to.
pub const PART_SUFFIX: &str = ".part";

/// Maximum Retry-After header value (1 hour) to prevent excessive delays.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);
