//! User-Agent string sent with every download request.

/// Project URL for User-Agent identification (RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/manifest-downloader";

/// Default User-Agent for download requests (identifies the tool).
#[must_use]
pub(crate) fn default_download_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("manifest-downloader/{version} (bulk-dataset-fetcher; +{PROJECT_UA_URL})")
}
