use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use manifest_downloader::{
    DownloadEngine, HttpClient, NoProgress, ProgressSink, RunReport, RunSummary, apply_filter,
    load_manifest, load_retry_set, record_failures,
};
use tracing::{debug, info, warn};

use crate::ProcessExit;
use crate::app::{exit_handler, progress::BarProgress, terminal};
use crate::cli::Args;

pub(crate) async fn run_downloader() -> Result<ProcessExit> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let no_color = terminal::should_disable_color(
        terminal::no_color_env_requested(),
        terminal::is_dumb_terminal(),
    );
    terminal::init_tracing(args.default_log_level(), no_color);

    debug!(?args, "CLI arguments parsed");

    let config = args.to_config();
    config.validate().context("invalid configuration")?;

    let mut manifest = load_manifest(&config.manifest_path)
        .with_context(|| format!("cannot load manifest {}", config.manifest_path.display()))?;
    if let Some(suffix) = config.require_suffix.as_deref() {
        manifest = manifest.require_suffix(suffix);
    }
    info!(
        records = manifest.len(),
        malformed = manifest.malformed.len(),
        duplicates = manifest.duplicates,
        filtered_out = manifest.filtered_out,
        "manifest loaded"
    );

    let retry_set = load_retry_set(&config.retry_path)
        .with_context(|| format!("cannot load retry file {}", config.retry_path.display()))?;
    for name in retry_set.unmatched(&manifest.records) {
        warn!(filename = name, "retry entry has no matching manifest record");
    }
    let records = apply_filter(manifest.records, &retry_set);

    if records.is_empty() {
        info!("nothing to download");
        return Ok(ProcessExit::Success);
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_signal = Arc::clone(&interrupted);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if exit_handler::register_interrupt(&interrupted_signal) {
                warn!("second interrupt received, exiting without waiting");
                std::process::exit(i32::from(ProcessExit::Interrupted.code()));
            }
            warn!("interrupt received, finishing in-flight attempts (Ctrl-C again to abort)");
        }
    });

    let client =
        HttpClient::new_with_timeouts(config.connect_timeout_secs, config.read_timeout_secs);
    let engine = DownloadEngine::new(config.worker_count, config.retry_policy())?
        .with_resume(config.resume)
        .with_interrupt_flag(Arc::clone(&interrupted));

    let use_bar = terminal::should_use_progress_bar(
        io::stderr().is_terminal(),
        args.quiet,
        args.no_progress,
        terminal::is_dumb_terminal(),
    );
    let progress: Arc<dyn ProgressSink> = if use_bar {
        Arc::new(BarProgress::new())
    } else {
        Arc::new(NoProgress)
    };

    info!(
        records = records.len(),
        workers = config.worker_count,
        output_dir = %config.output_dir.display(),
        "starting downloads"
    );
    let report = engine
        .run(records, &client, &config.output_dir, progress)
        .await?;

    if !args.quiet {
        print_completion_summary(&report);
    }

    let logged = record_failures(&report.outcomes, &config.failure_log_path);

    if let Some(path) = config.summary_json.as_deref() {
        RunSummary::from(&report)
            .write_json(path)
            .with_context(|| format!("cannot write run summary {}", path.display()))?;
        debug!(path = %path.display(), "wrote run summary");
    }

    let logged = logged.context("cannot record failed downloads")?;
    if logged > 0 {
        info!(
            count = logged,
            path = %config.failure_log_path.display(),
            "failed filenames appended; pass this file with --retry to reprocess them"
        );
    }

    let was_interrupted = report.was_interrupted() || interrupted.load(Ordering::SeqCst);
    if was_interrupted {
        warn!(
            cancelled = report.stats.cancelled(),
            "Interrupted. Run again to resume."
        );
    }

    Ok(exit_handler::determine_exit_outcome(was_interrupted))
}

fn print_completion_summary(report: &RunReport) {
    let stats = &report.stats;
    println!(
        "Downloaded {} file(s), {} already present, {} failed, {} cancelled ({} retries)",
        stats.downloaded(),
        stats.already_present(),
        stats.failed(),
        stats.cancelled(),
        stats.retried()
    );
    for name in report.failed_filenames() {
        println!("  failed: {name}");
    }
}
