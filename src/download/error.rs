//! Error types for the download module.
//!
//! This module defines structured errors for a single fetch attempt,
//! providing context-rich error messages for logs and the failure summary.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during one download attempt.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, reset mid-body, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present (for 429 responses).
        retry_after: Option<String>,
    },

    /// The server rejected the byte range used to resume a partial file.
    #[error("HTTP 416 resuming {url} at byte {offset}; partial file discarded")]
    RangeNotSatisfiable {
        /// The URL being resumed.
        url: String,
        /// Byte offset that was requested.
        offset: u64,
    },

    /// A `206` reply to a resume request did not start where the partial file ends.
    #[error("HTTP 206 from {url} did not continue at byte {requested}; partial file discarded")]
    UnexpectedRange {
        /// The URL being resumed.
        url: String,
        /// Byte offset that was requested.
        requested: u64,
        /// First byte the server actually sent, if it said.
        started_at: Option<u64>,
    },

    /// The body ended before the advertised Content-Length was received.
    #[error("incomplete download of {url}: expected {expected_bytes} bytes, got {actual_bytes}")]
    Incomplete {
        /// The URL being downloaded.
        url: String,
        /// Size announced by the server.
        expected_bytes: u64,
        /// Size actually written.
        actual_bytes: u64,
    },

    /// File system error during download (create file, write, rename, etc.)
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a range-not-satisfiable error.
    pub fn range_not_satisfiable(url: impl Into<String>, offset: u64) -> Self {
        Self::RangeNotSatisfiable {
            url: url.into(),
            offset,
        }
    }

    /// Creates an error for a `206` reply that does not continue the partial file.
    pub fn unexpected_range(
        url: impl Into<String>,
        requested: u64,
        started_at: Option<u64>,
    ) -> Self {
        Self::UnexpectedRange {
            url: url.into(),
            requested,
            started_at,
        }
    }

    /// Creates an incomplete-body error.
    pub fn incomplete(url: impl Into<String>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Incomplete {
            url: url.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs the
// url or path the source error does not carry.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_timeout_display() {
        let error = DownloadError::timeout("https://example.com/sa_000000.tar");
        assert!(error.to_string().contains("timeout"));
        assert!(error.to_string().contains("https://example.com/sa_000000.tar"));
    }

    #[test]
    fn test_download_error_http_status_display() {
        let error = DownloadError::http_status("https://example.com/file.tar", 503);
        let msg = error.to_string();
        assert!(msg.contains("503"), "Expected '503' in: {msg}");
        assert!(
            msg.contains("https://example.com/file.tar"),
            "Expected URL in: {msg}"
        );
    }

    #[test]
    fn test_download_error_io_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = DownloadError::io(PathBuf::from("/tmp/a.tar.part"), io_error);
        let msg = error.to_string();
        assert!(msg.contains("/tmp/a.tar.part"), "Expected path in: {msg}");
    }

    #[test]
    fn test_download_error_incomplete_display() {
        let error = DownloadError::incomplete("https://example.com/a.tar", 100, 10);
        let msg = error.to_string();
        assert!(msg.contains("expected 100 bytes, got 10"), "got: {msg}");
    }

    #[test]
    fn test_download_error_range_not_satisfiable_display() {
        let error = DownloadError::range_not_satisfiable("https://example.com/a.tar", 42);
        let msg = error.to_string();
        assert!(msg.contains("416"), "got: {msg}");
        assert!(msg.contains("42"), "got: {msg}");
    }

    #[test]
    fn test_download_error_unexpected_range_display() {
        let error = DownloadError::unexpected_range("https://example.com/a.tar", 6, Some(0));
        let msg = error.to_string();
        assert!(msg.contains("206"), "got: {msg}");
        assert!(msg.contains("byte 6"), "got: {msg}");
    }

    #[test]
    fn test_download_error_invalid_url_display() {
        let error = DownloadError::invalid_url("not-a-url");
        let msg = error.to_string();
        assert!(
            msg.contains("invalid URL"),
            "Expected 'invalid URL' in: {msg}"
        );
        assert!(msg.contains("not-a-url"), "Expected URL in: {msg}");
    }
}
