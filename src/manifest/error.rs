//! Error types for manifest and retry-file loading.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a run before any download starts.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file does not exist.
    #[error("manifest not found: {path}\n  Suggestion: pass the TSV file with --input")]
    NotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The manifest exists but could not be read (permissions, non-UTF-8 content).
    #[error("cannot read manifest {path}: {source}")]
    Read {
        /// Path of the manifest.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The retry file exists but could not be read.
    #[error("cannot read retry file {path}: {source}")]
    RetryFile {
        /// Path of the retry file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl ManifestError {
    /// Maps an IO error raised while reading the manifest.
    pub fn from_manifest_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Read { path, source }
        }
    }

    /// Creates a retry-file read error.
    pub fn retry_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::RetryFile {
            path: path.into(),
            source,
        }
    }
}

/// Why a manifest line was skipped.
///
/// Malformed lines are reported as warnings; they never abort a load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedReason {
    /// The line does not split into exactly `filename<TAB>url`.
    #[error("expected 2 tab-separated fields, found {found}")]
    FieldCount {
        /// Number of fields on the line.
        found: usize,
    },

    /// The filename would escape the output directory or is otherwise unusable.
    #[error("unsafe filename '{filename}'")]
    UnsafeFilename {
        /// The rejected filename.
        filename: String,
    },

    /// The filename collides with the temporary suffix used for in-flight transfers.
    #[error("filename '{filename}' uses the reserved '{suffix}' suffix")]
    ReservedSuffix {
        /// The rejected filename.
        filename: String,
        /// The reserved suffix.
        suffix: &'static str,
    },

    /// The URL does not parse or is not http/https.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Parser message or scheme complaint.
        reason: String,
    },
}
