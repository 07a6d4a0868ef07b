//! Manifest parsing for `filename<TAB>url` download lists.
//!
//! A manifest is a UTF-8 text file with one record per line and no header
//! row. Blank lines are ignored. Lines that cannot be turned into a
//! [`DownloadRecord`] are collected as [`MalformedLine`] entries and logged,
//! but never abort the load.
//!
//! # Example
//!
//! ```
//! use manifest_downloader::manifest::parse_manifest;
//!
//! let manifest = parse_manifest("a.tar\thttps://example.com/a\nbroken line\n");
//! assert_eq!(manifest.records.len(), 1);
//! assert_eq!(manifest.records[0].filename, "a.tar");
//! assert_eq!(manifest.malformed.len(), 1);
//! ```

mod error;
mod retry_set;

pub use error::{MalformedReason, ManifestError};
pub use retry_set::{RetrySet, apply_filter, load_retry_set};

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Component, Path};

use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::download::PART_SUFFIX;

/// One file to fetch: where it goes and where it comes from.
#[derive(Debug, Clone)]
pub struct DownloadRecord {
    /// Target filename, relative to the output directory.
    pub filename: String,
    /// Source URL.
    pub url: String,
    /// 1-based manifest line the record was read from (0 when built in code).
    pub line: usize,
}

impl DownloadRecord {
    /// Creates a record that did not come from a manifest file.
    #[must_use]
    pub fn new(filename: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            url: url.into(),
            line: 0,
        }
    }
}

// Line numbers are diagnostics only.
impl PartialEq for DownloadRecord {
    fn eq(&self, other: &Self) -> bool {
        self.filename == other.filename && self.url == other.url
    }
}

impl Eq for DownloadRecord {}

impl Hash for DownloadRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.filename.hash(state);
        self.url.hash(state);
    }
}

/// A manifest line that was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLine {
    /// 1-based line number.
    pub line: usize,
    /// Why the line was rejected.
    pub reason: MalformedReason,
}

/// Result of parsing a manifest.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    /// Records in first-occurrence order, unique by filename.
    pub records: Vec<DownloadRecord>,
    /// Lines that were skipped.
    pub malformed: Vec<MalformedLine>,
    /// Number of lines whose filename repeated an earlier record.
    pub duplicates: usize,
    /// Number of records dropped by [`Manifest::require_suffix`].
    pub filtered_out: usize,
}

impl Manifest {
    /// Returns the number of usable records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the manifest produced no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Keeps only records whose filename ends with `suffix`.
    #[must_use]
    pub fn require_suffix(mut self, suffix: &str) -> Self {
        let before = self.records.len();
        self.records.retain(|record| record.filename.ends_with(suffix));
        self.filtered_out += before - self.records.len();
        if self.filtered_out > 0 {
            info!(
                suffix,
                filtered_out = self.filtered_out,
                "dropped records without required suffix"
            );
        }
        self
    }
}

/// Loads and parses a manifest file.
///
/// # Errors
///
/// Returns [`ManifestError::NotFound`] if the file does not exist and
/// [`ManifestError::Read`] if it cannot be read as UTF-8 text.
#[instrument(fields(path = %path.display()))]
pub fn load_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ManifestError::from_manifest_io(path, e))?;
    let manifest = parse_manifest(&text);

    info!(
        records = manifest.len(),
        malformed = manifest.malformed.len(),
        duplicates = manifest.duplicates,
        "loaded manifest"
    );
    Ok(manifest)
}

/// Parses manifest text into records.
///
/// When a filename appears more than once, the last URL wins and the record
/// keeps the position of its first occurrence, so every target filename is
/// owned by exactly one record.
#[must_use]
pub fn parse_manifest(text: &str) -> Manifest {
    let mut manifest = Manifest::default();
    let mut index_by_filename: HashMap<String, usize> = HashMap::new();

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if raw_line.trim().is_empty() {
            continue;
        }

        match parse_line(raw_line) {
            Ok((filename, url)) => {
                if let Some(&existing) = index_by_filename.get(filename) {
                    let record = &mut manifest.records[existing];
                    warn!(
                        filename,
                        line = line_no,
                        first_line = record.line,
                        "duplicate filename in manifest; later URL wins"
                    );
                    record.url = url.to_string();
                    record.line = line_no;
                    manifest.duplicates += 1;
                    continue;
                }
                index_by_filename.insert(filename.to_string(), manifest.records.len());
                manifest.records.push(DownloadRecord {
                    filename: filename.to_string(),
                    url: url.to_string(),
                    line: line_no,
                });
            }
            Err(reason) => {
                warn!(line = line_no, %reason, "skipping malformed manifest line");
                manifest.malformed.push(MalformedLine {
                    line: line_no,
                    reason,
                });
            }
        }
    }

    debug!(
        records = manifest.records.len(),
        malformed = manifest.malformed.len(),
        "parsed manifest"
    );
    manifest
}

fn parse_line(line: &str) -> Result<(&str, &str), MalformedReason> {
    // Stray tabs at either end (spreadsheet exports) are not extra fields.
    let fields: Vec<&str> = line.trim().split('\t').map(str::trim).collect();
    let [filename, url] = fields[..] else {
        return Err(MalformedReason::FieldCount {
            found: fields.len(),
        });
    };

    validate_filename(filename)?;
    validate_url(url)?;
    Ok((filename, url))
}

fn validate_filename(filename: &str) -> Result<(), MalformedReason> {
    let all_normal = Path::new(filename)
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    if !all_normal || filename.ends_with('/') || filename.contains('\\') {
        return Err(MalformedReason::UnsafeFilename {
            filename: filename.to_string(),
        });
    }
    if filename.ends_with(PART_SUFFIX) {
        return Err(MalformedReason::ReservedSuffix {
            filename: filename.to_string(),
            suffix: PART_SUFFIX,
        });
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<(), MalformedReason> {
    let parsed = Url::parse(url).map_err(|e| MalformedReason::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(MalformedReason::InvalidUrl {
            url: url.to_string(),
            reason: format!("scheme '{scheme}' is not supported"),
        }),
    }
}
