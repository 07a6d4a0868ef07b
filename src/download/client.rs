//! HTTP client wrapper for downloading files.
//!
//! This module provides the `HttpClient` struct which streams a response body
//! into a `.part` file next to the target and renames it into place only once
//! the transfer is complete.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_RANGE, RANGE, RETRY_AFTER};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, PART_SUFFIX, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use crate::user_agent;

/// HTTP client for downloading files with streaming support.
///
/// This client is designed to be created once and shared by every worker,
/// taking advantage of connection pooling.
///
/// # Example
///
/// ```no_run
/// use manifest_downloader::download::HttpClient;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new();
/// let fetched = client
///     .fetch_to_path("https://example.com/sa_000000.tar", Path::new("raw/sa_000000.tar"), true)
///     .await?;
/// println!("Downloaded {} bytes", fetched.bytes);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

/// Result of one successful transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// Final output path.
    pub path: PathBuf,
    /// Size of the final file.
    pub bytes: u64,
    /// Whether an existing `.part` file was continued with a range request.
    pub resumed: bool,
}

/// Byte-level progress of a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEvent {
    /// The server answered; `offset` bytes are already on disk from an
    /// earlier attempt and `total` is the full size when known.
    Started {
        /// Bytes kept from the `.part` file.
        offset: u64,
        /// Expected final size.
        total: Option<u64>,
    },
    /// Another chunk of this many bytes was written.
    Received(u64),
}

/// Parsed `Content-Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ContentRange {
    /// First byte of the body; `None` for the `bytes */<total>` form.
    start: Option<u64>,
    /// Complete length of the resource; `None` when the server sent `*`.
    total: Option<u64>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes without receiving data
    /// - Gzip decompression: enabled
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(user_agent::default_download_user_agent())
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Downloads `url` to `final_path` through a temporary `.part` file.
    ///
    /// Same as [`HttpClient::fetch_to_path_with_progress`] without a
    /// progress callback.
    ///
    /// # Errors
    ///
    /// See [`HttpClient::fetch_to_path_with_progress`].
    #[must_use = "fetch result contains the final path and size"]
    pub async fn fetch_to_path(
        &self,
        url: &str,
        final_path: &Path,
        resume: bool,
    ) -> Result<FetchResult, DownloadError> {
        self.fetch_to_path_with_progress(url, final_path, resume, &|_: TransferEvent| {}).await
    }

    /// Downloads `url` to `final_path`, reporting bytes as they arrive.
    ///
    /// The body is streamed into `<final_path>.part`, flushed and synced, then
    /// renamed to `final_path`. A failure at any point leaves nothing under
    /// the final name.
    ///
    /// When `resume` is true and a non-empty `.part` file exists, the request
    /// asks for the remaining bytes with a `Range` header:
    /// - `206` whose `Content-Range` starts at the end of the `.part` file is
    ///   appended; one that starts at byte 0 rewrites the file; any other
    ///   start discards the `.part` file and fails the attempt.
    /// - `200` restarts the file from scratch.
    /// - `416` whose `Content-Range: bytes */<total>` equals the `.part` size
    ///   means the file was already complete and it is renamed into place.
    ///   Otherwise the `.part` file is discarded and the attempt fails.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if:
    /// - The URL is invalid
    /// - The request fails (network error, timeout, connection dropped mid-body)
    /// - The server returns a non-2xx status
    /// - A resumed reply does not continue the `.part` file
    /// - The body is shorter or longer than the advertised size
    /// - Writing or renaming on disk fails
    #[must_use = "fetch result contains the final path and size"]
    #[instrument(skip(self, on_progress), fields(url = %url, path = %final_path.display()))]
    pub async fn fetch_to_path_with_progress(
        &self,
        url: &str,
        final_path: &Path,
        resume: bool,
        on_progress: &(dyn Fn(TransferEvent) + Send + Sync),
    ) -> Result<FetchResult, DownloadError> {
        debug!("starting download");

        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }

        let part_path = part_path_for(final_path);
        let existing_bytes = if resume {
            tokio::fs::metadata(&part_path)
                .await
                .map(|meta| meta.len())
                .unwrap_or(0)
        } else {
            0
        };

        let range_value = (existing_bytes > 0).then(|| format!("bytes={existing_bytes}-"));
        let response = self.send_request(url, range_value.as_deref()).await?;
        let content_range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range);

        if existing_bytes > 0 && response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            if content_range.and_then(|range| range.total) == Some(existing_bytes) {
                debug!(path = %part_path.display(), "partial file is already complete");
                return finish(&part_path, final_path, existing_bytes, true).await;
            }
            debug!(path = %part_path.display(), "range rejected; discarding partial file");
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(DownloadError::range_not_satisfiable(url, existing_bytes));
        }

        let response = error_for_status(url, response)?;

        let resumed = if existing_bytes > 0 && response.status() == StatusCode::PARTIAL_CONTENT {
            match content_range.and_then(|range| range.start) {
                Some(start) if start == existing_bytes => true,
                Some(0) => {
                    debug!("server sent the whole body; rewriting partial file");
                    false
                }
                start => {
                    debug!(
                        path = %part_path.display(),
                        ?start,
                        "range mismatch; discarding partial file"
                    );
                    let _ = tokio::fs::remove_file(&part_path).await;
                    return Err(DownloadError::unexpected_range(url, existing_bytes, start));
                }
            }
        } else {
            false
        };
        let offset = if resumed { existing_bytes } else { 0 };
        let expected_total = content_range
            .and_then(|range| range.total)
            .or_else(|| response.content_length().map(|len| offset + len));

        let mut file = if resumed {
            tokio::fs::OpenOptions::new()
                .append(true)
                .open(&part_path)
                .await
                .map_err(|e| DownloadError::io(part_path.clone(), e))?
        } else {
            File::create(&part_path)
                .await
                .map_err(|e| DownloadError::io(part_path.clone(), e))?
        };

        on_progress(TransferEvent::Started {
            offset,
            total: expected_total,
        });
        let stream_result = stream_to_file(&mut file, response, url, &part_path, on_progress).await;
        drop(file);

        let bytes_written = match stream_result {
            Ok(bytes) => bytes,
            Err(e) => {
                if !resume {
                    debug!(path = %part_path.display(), "cleaning up partial file after error");
                    let _ = tokio::fs::remove_file(&part_path).await;
                }
                return Err(e);
            }
        };

        let final_size = offset + bytes_written;
        if let Some(expected) = expected_total
            && expected != final_size
        {
            // A short file can still be continued; an oversized one cannot.
            if !resume || final_size > expected {
                let _ = tokio::fs::remove_file(&part_path).await;
            }
            return Err(DownloadError::incomplete(url, expected, final_size));
        }

        finish(&part_path, final_path, final_size, resumed).await
    }

    async fn send_request(
        &self,
        url: &str,
        range_header: Option<&str>,
    ) -> Result<reqwest::Response, DownloadError> {
        let mut request = self.client.get(url);
        if let Some(range) = range_header {
            request = request.header(RANGE, range);
        }

        request.send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })
    }
}

/// Returns the temporary path used while `final_path` is being downloaded.
#[must_use]
pub fn part_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_os_string();
    name.push(PART_SUFFIX);
    PathBuf::from(name)
}

fn error_for_status(
    url: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, DownloadError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    Err(DownloadError::http_status_with_retry_after(
        url,
        response.status().as_u16(),
        retry_after,
    ))
}

/// Parses `bytes <start>-<end>/<total>` and `bytes */<total>`.
fn parse_content_range(value: &str) -> Option<ContentRange> {
    let (range, total) = value.trim().strip_prefix("bytes ")?.split_once('/')?;

    let total: Option<u64> = match total.trim() {
        "*" => None,
        digits => Some(digits.parse().ok()?),
    };

    let start = match range.trim() {
        "*" => None,
        span => {
            let (start, end) = span.split_once('-')?;
            let start: u64 = start.trim().parse().ok()?;
            let end: u64 = end.trim().parse().ok()?;
            if end < start {
                return None;
            }
            Some(start)
        }
    };

    Some(ContentRange { start, total })
}

async fn finish(
    part_path: &Path,
    final_path: &Path,
    bytes: u64,
    resumed: bool,
) -> Result<FetchResult, DownloadError> {
    tokio::fs::rename(part_path, final_path)
        .await
        .map_err(|e| DownloadError::io(final_path, e))?;

    info!(bytes, resumed, "download complete");

    Ok(FetchResult {
        path: final_path.to_path_buf(),
        bytes,
        resumed,
    })
}

/// Streams response body to file, returning bytes written.
///
/// This is extracted to enable cleanup on error in the caller.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
    on_progress: &(dyn Fn(TransferEvent) + Send + Sync),
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;

        bytes_written += chunk.len() as u64;
        on_progress(TransferEvent::Received(chunk.len() as u64));
    }

    // Ensure all data is on disk before the caller renames the file
    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;
    writer
        .get_mut()
        .sync_all()
        .await
        .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;

    Ok(bytes_written)
}
