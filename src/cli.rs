//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use manifest_downloader::RunConfig;
use manifest_downloader::config::{
    DEFAULT_FAILURE_LOG_PATH, DEFAULT_MANIFEST_PATH, DEFAULT_OUTPUT_DIR, DEFAULT_RETRY_PATH,
};
use manifest_downloader::download::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use manifest_downloader::{DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES};

/// Fetch every file listed in a tab-separated manifest.
///
/// Each manifest line is `filename<TAB>url`. Files land in the output
/// directory under their manifest name; records that still fail after all
/// retries are appended to the failure log, which can be passed back with
/// `--retry` to reprocess only those.
#[derive(Parser, Debug)]
#[command(name = "manifest-downloader")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Manifest of filename<TAB>url lines
    #[arg(short = 'i', long, default_value = DEFAULT_MANIFEST_PATH)]
    pub input: PathBuf,

    /// Only download filenames listed in this file (ignored if absent or empty)
    #[arg(long, default_value = DEFAULT_RETRY_PATH)]
    pub retry: PathBuf,

    /// Directory downloads are written to
    #[arg(short = 'o', long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,

    /// Number of concurrent workers (1-100)
    #[arg(
        short = 'c',
        long,
        visible_alias = "cpus",
        default_value_t = DEFAULT_CONCURRENCY as u8,
        value_parser = clap::value_parser!(u8).range(1..=100)
    )]
    pub workers: u8,

    /// Retries per file after the first attempt (0-50)
    #[arg(
        short = 'r',
        long,
        default_value_t = DEFAULT_MAX_RETRIES as u8,
        value_parser = clap::value_parser!(u8).range(0..=50)
    )]
    pub max_retries: u8,

    /// File that failed filenames are appended to
    #[arg(long, default_value = DEFAULT_FAILURE_LOG_PATH)]
    pub failed_log: PathBuf,

    /// Base delay before the first retry, in milliseconds
    #[arg(long, default_value_t = 500, value_parser = clap::value_parser!(u64).range(0..=600_000))]
    pub backoff_ms: u64,

    /// Upper bound on a single backoff delay, in seconds
    #[arg(long, default_value_t = 32, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub max_backoff_secs: u64,

    /// HTTP connect timeout in seconds
    #[arg(
        long,
        default_value_t = CONNECT_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..=3600)
    )]
    pub connect_timeout: u64,

    /// Seconds without receiving data before a transfer is abandoned
    #[arg(
        long,
        default_value_t = READ_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..=86_400)
    )]
    pub timeout: u64,

    /// Only accept manifest filenames ending with this suffix (e.g. .tar)
    #[arg(long, value_name = "SUFFIX")]
    pub require_suffix: Option<String>,

    /// Restart partial downloads instead of resuming them
    #[arg(long)]
    pub no_resume: bool,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Write a JSON run summary to this path
    #[arg(long, value_name = "PATH")]
    pub summary_json: Option<PathBuf>,
}

impl Args {
    /// Maps parsed flags onto a run configuration.
    pub fn to_config(&self) -> RunConfig {
        RunConfig {
            manifest_path: self.input.clone(),
            retry_path: self.retry.clone(),
            output_dir: self.output.clone(),
            failure_log_path: self.failed_log.clone(),
            worker_count: usize::from(self.workers),
            max_retries: u32::from(self.max_retries),
            base_backoff: Duration::from_millis(self.backoff_ms),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
            connect_timeout_secs: self.connect_timeout,
            read_timeout_secs: self.timeout,
            require_suffix: self.require_suffix.clone(),
            resume: !self.no_resume,
            summary_json: self.summary_json.clone(),
        }
    }

    /// Default log level derived from `-v`/`-q`.
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["manifest-downloader"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert_eq!(args.input, PathBuf::from("download_links.tsv"));
        assert_eq!(args.retry, PathBuf::from("retry.txt"));
        assert_eq!(args.output, PathBuf::from("raw"));
        assert_eq!(args.failed_log, PathBuf::from("failed_downloads.txt"));
        assert_eq!(args.workers, 10); // DEFAULT_CONCURRENCY
        assert_eq!(args.max_retries, 10); // DEFAULT_MAX_RETRIES
        assert_eq!(args.backoff_ms, 500);
        assert_eq!(args.max_backoff_secs, 32);
        assert!(!args.no_resume);
        assert!(args.require_suffix.is_none());
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["manifest-downloader", "-v"]).unwrap();
        assert_eq!(args.verbose, 1);
        assert_eq!(args.default_log_level(), "debug");

        let args = Args::try_parse_from(["manifest-downloader", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
        assert_eq!(args.default_log_level(), "trace");
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = Args::try_parse_from(["manifest-downloader", "--quiet"]).unwrap();
        assert!(args.quiet);
        assert_eq!(args.default_log_level(), "error");
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["manifest-downloader", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let err = Args::try_parse_from(["manifest-downloader", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let err = Args::try_parse_from(["manifest-downloader", "--invalid-flag"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    // ==================== Path Flags ====================

    #[test]
    fn test_cli_path_flags() {
        let args = Args::try_parse_from([
            "manifest-downloader",
            "-i",
            "links.tsv",
            "--retry",
            "again.txt",
            "-o",
            "out",
            "--failed-log",
            "bad.txt",
        ])
        .unwrap();
        assert_eq!(args.input, PathBuf::from("links.tsv"));
        assert_eq!(args.retry, PathBuf::from("again.txt"));
        assert_eq!(args.output, PathBuf::from("out"));
        assert_eq!(args.failed_log, PathBuf::from("bad.txt"));
    }

    // ==================== Worker Tests ====================

    #[test]
    fn test_cli_workers_short_flag() {
        let args = Args::try_parse_from(["manifest-downloader", "-c", "5"]).unwrap();
        assert_eq!(args.workers, 5);
    }

    #[test]
    fn test_cli_workers_cpus_alias() {
        let args = Args::try_parse_from(["manifest-downloader", "--cpus", "20"]).unwrap();
        assert_eq!(args.workers, 20);
    }

    #[test]
    fn test_cli_workers_zero_rejected() {
        let err = Args::try_parse_from(["manifest-downloader", "-c", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_workers_over_max_rejected() {
        let err = Args::try_parse_from(["manifest-downloader", "-c", "101"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    // ==================== Max Retries Tests ====================

    #[test]
    fn test_cli_max_retries_zero_allowed() {
        let args = Args::try_parse_from(["manifest-downloader", "-r", "0"]).unwrap();
        assert_eq!(args.max_retries, 0);
    }

    #[test]
    fn test_cli_max_retries_over_max_rejected() {
        let err = Args::try_parse_from(["manifest-downloader", "-r", "51"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    // ==================== Config Mapping ====================

    #[test]
    fn test_cli_to_config_maps_every_flag() {
        let args = Args::try_parse_from([
            "manifest-downloader",
            "-c",
            "4",
            "-r",
            "3",
            "--backoff-ms",
            "100",
            "--max-backoff-secs",
            "2",
            "--connect-timeout",
            "5",
            "--timeout",
            "60",
            "--require-suffix",
            ".tar",
            "--no-resume",
            "--summary-json",
            "summary.json",
        ])
        .unwrap();
        let config = args.to_config();

        assert_eq!(config.worker_count, 4);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_backoff, Duration::from_millis(100));
        assert_eq!(config.max_backoff, Duration::from_secs(2));
        assert_eq!(config.connect_timeout_secs, 5);
        assert_eq!(config.read_timeout_secs, 60);
        assert_eq!(config.require_suffix.as_deref(), Some(".tar"));
        assert!(!config.resume);
        assert_eq!(config.summary_json, Some(PathBuf::from("summary.json")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_default_config_matches_library_default() {
        let args = Args::try_parse_from(["manifest-downloader"]).unwrap();
        assert_eq!(args.to_config(), RunConfig::default());
    }
}
