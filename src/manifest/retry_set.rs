//! Retry-set filter: restricts a run to filenames listed in a retry file.
//!
//! A previous run's failure log (or a hand-edited subset of it) can be fed
//! back as the retry file to reprocess only outstanding items. An absent or
//! empty retry file means "no filter".

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info, instrument};

use super::{DownloadRecord, ManifestError};

/// Set of filenames a run is restricted to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrySet {
    filenames: HashSet<String>,
}

impl RetrySet {
    /// Builds a retry set from one-filename-per-line text; blank lines are ignored.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let filenames = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect();
        Self { filenames }
    }

    /// Returns true when the set imposes no filter.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filenames.is_empty()
    }

    /// Returns the number of distinct filenames in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filenames.len()
    }

    /// Returns true if `filename` is in the set.
    #[must_use]
    pub fn contains(&self, filename: &str) -> bool {
        self.filenames.contains(filename)
    }

    /// Lists retry entries with no matching manifest record, sorted.
    #[must_use]
    pub fn unmatched(&self, records: &[DownloadRecord]) -> Vec<&str> {
        let known: HashSet<&str> = records.iter().map(|r| r.filename.as_str()).collect();
        let mut missing: Vec<&str> = self
            .filenames
            .iter()
            .map(String::as_str)
            .filter(|name| !known.contains(name))
            .collect();
        missing.sort_unstable();
        missing
    }
}

impl<S: Into<String>> FromIterator<S> for RetrySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            filenames: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Loads the retry set from `path`.
///
/// A missing file yields an empty set.
///
/// # Errors
///
/// Returns [`ManifestError::RetryFile`] if the file exists but cannot be read.
#[instrument(fields(path = %path.display()))]
pub fn load_retry_set(path: &Path) -> Result<RetrySet, ManifestError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("no retry file found; processing every manifest record");
            return Ok(RetrySet::default());
        }
        Err(e) => return Err(ManifestError::retry_file(path, e)),
    };

    let retry_set = RetrySet::parse(&text);
    if retry_set.is_empty() {
        info!("retry file is empty; processing every manifest record");
    } else {
        info!(entries = retry_set.len(), "restricting run to retry file entries");
    }
    Ok(retry_set)
}

/// Keeps only records named in `retry_set`, or all records when it is empty.
#[must_use]
pub fn apply_filter(records: Vec<DownloadRecord>, retry_set: &RetrySet) -> Vec<DownloadRecord> {
    if retry_set.is_empty() {
        return records;
    }
    let before = records.len();
    let kept: Vec<DownloadRecord> = records
        .into_iter()
        .filter(|record| retry_set.contains(&record.filename))
        .collect();
    debug!(before, after = kept.len(), "applied retry filter");
    kept
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn records() -> Vec<DownloadRecord> {
        vec![
            DownloadRecord::new("a.tar", "https://example.com/1"),
            DownloadRecord::new("b.tar", "https://example.com/2"),
            DownloadRecord::new("c.tar", "https://example.com/1"),
        ]
    }

    #[test]
    fn test_empty_retry_set_keeps_everything() {
        let filtered = apply_filter(records(), &RetrySet::default());
        assert_eq!(filtered, records());
    }

    #[test]
    fn test_retry_set_keeps_only_members() {
        let retry_set: RetrySet = ["b.tar"].into_iter().collect();
        let filtered = apply_filter(records(), &retry_set);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].filename, "b.tar");
    }

    #[test]
    fn test_retry_set_parse_ignores_blank_lines_and_whitespace() {
        let retry_set = RetrySet::parse("\n  b.tar  \n\n a.tar\n");
        assert_eq!(retry_set.len(), 2);
        assert!(retry_set.contains("a.tar"));
        assert!(retry_set.contains("b.tar"));
    }

    #[test]
    fn test_retry_set_parse_blank_text_is_empty() {
        assert!(RetrySet::parse("\n   \n").is_empty());
    }

    #[test]
    fn test_unmatched_reports_unknown_names() {
        let retry_set: RetrySet = ["b.tar", "zzz.tar", "missing.tar"].into_iter().collect();
        assert_eq!(retry_set.unmatched(&records()), vec!["missing.tar", "zzz.tar"]);
    }

    #[test]
    fn test_load_retry_set_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let retry_set = load_retry_set(&temp_dir.path().join("retry.txt")).unwrap();
        assert!(retry_set.is_empty());
    }

    #[test]
    fn test_load_retry_set_empty_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("retry.txt");
        std::fs::write(&path, "").unwrap();
        assert!(load_retry_set(&path).unwrap().is_empty());
    }

    #[test]
    fn test_load_retry_set_reads_entries() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("retry.txt");
        std::fs::write(&path, "b.tar\n").unwrap();
        let retry_set = load_retry_set(&path).unwrap();
        assert!(retry_set.contains("b.tar"));
        assert!(!retry_set.contains("a.tar"));
    }

    #[test]
    fn test_load_retry_set_directory_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = load_retry_set(temp_dir.path());
        assert!(matches!(result, Err(ManifestError::RetryFile { .. })));
    }
}
