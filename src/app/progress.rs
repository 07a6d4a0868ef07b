//! Progress bars for download runs.
//!
//! One overall bar counts finished records; each record with a transfer in
//! flight gets its own byte bar above it.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use manifest_downloader::{DownloadRecord, DownloadStats, Outcome, ProgressSink, TransferEvent};

const OVERALL_TEMPLATE: &str =
    "{spinner} [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta}) {msg}";

const TRANSFER_TEMPLATE: &str =
    "  {wide_msg} [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec} ({eta})";

const TRANSFER_SPINNER_TEMPLATE: &str = "  {spinner} {wide_msg} {bytes} {bytes_per_sec}";

/// Renders run progress on stderr with indicatif bars.
pub(crate) struct BarProgress {
    multi: MultiProgress,
    overall: ProgressBar,
    transfers: Mutex<HashMap<String, ProgressBar>>,
}

impl BarProgress {
    /// Creates bars drawn on stderr.
    pub(crate) fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);
        let overall = multi.add(ProgressBar::new(0));
        overall.set_style(
            ProgressStyle::with_template(OVERALL_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self {
            multi,
            overall,
            transfers: Mutex::new(HashMap::new()),
        }
    }

    fn transfer_bar(&self, record: &DownloadRecord, total: Option<u64>) -> ProgressBar {
        let mut transfers = self.transfers.lock().unwrap_or_else(PoisonError::into_inner);
        transfers
            .entry(record.filename.clone())
            .or_insert_with(|| {
                let bar = self.multi.insert_before(&self.overall, ProgressBar::no_length());
                bar.set_message(record.filename.clone());
                bar
            })
            .clone()
            .with_style(transfer_style(total))
    }

    #[cfg(test)]
    fn position(&self) -> u64 {
        self.overall.position()
    }

    #[cfg(test)]
    fn transfer_position(&self, filename: &str) -> Option<(u64, Option<u64>)> {
        let transfers = self.transfers.lock().unwrap_or_else(PoisonError::into_inner);
        transfers.get(filename).map(|bar| (bar.position(), bar.length()))
    }
}

fn transfer_style(total: Option<u64>) -> ProgressStyle {
    let template = if total.is_some() {
        TRANSFER_TEMPLATE
    } else {
        TRANSFER_SPINNER_TEMPLATE
    };
    ProgressStyle::with_template(template)
        .map(|style| style.progress_chars("=> "))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

impl ProgressSink for BarProgress {
    fn run_started(&self, total: usize) {
        self.overall.set_length(total as u64);
        self.overall.enable_steady_tick(Duration::from_millis(120));
    }

    fn transfer_progress(&self, record: &DownloadRecord, event: TransferEvent) {
        match event {
            TransferEvent::Started { offset, total } => {
                let bar = self.transfer_bar(record, total);
                if let Some(total) = total {
                    bar.set_length(total);
                } else {
                    bar.unset_length();
                }
                bar.reset_eta();
                bar.set_position(offset);
            }
            TransferEvent::Received(bytes) => {
                let transfers = self.transfers.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(bar) = transfers.get(&record.filename) {
                    bar.inc(bytes);
                }
            }
        }
    }

    fn record_finished(&self, record: &DownloadRecord, _outcome: &Outcome, stats: &DownloadStats) {
        let finished = self
            .transfers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&record.filename);
        if let Some(bar) = finished {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }

        self.overall.inc(1);
        self.overall.set_message(format!("{} ok, {} failed", stats.succeeded(), stats.failed()));
    }

    fn run_finished(&self, _stats: &DownloadStats) {
        self.overall.finish_and_clear();
    }
}
