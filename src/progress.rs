//! Progress reporting: count bars for known totals, spinners for open-ended API streams.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const BAR_CHARS: &str = "█▉▊▋▌▍▎▏  ";

fn count_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.green} {msg} {pos}/{len} [{bar:.cyan/blue}] {percent:>3}%  \
         it/s: {per_sec}  elapsed: {elapsed_precise}  eta: {eta_precise}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars(BAR_CHARS)
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg} {pos} items  {per_sec}  elapsed: {elapsed_precise}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Count-style progress bar (items processed out of total), with an optional label.
pub fn make_count_progress(total: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(count_style());
    if !label.is_empty() {
        pb.set_message(label.to_string());
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Spinner for streams of unknown length (API pagination).
pub fn make_spinner(label: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    if !label.is_empty() {
        pb.set_message(label.to_string());
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Thin wrapper so call sites don't branch on "progress enabled".
/// A disabled scope is backed by a hidden bar.
pub struct ProgressScope {
    pb: ProgressBar,
}

impl ProgressScope {
    pub fn count(enabled: bool, label: impl Into<String>, total: u64) -> Self {
        let pb = if enabled { make_count_progress(total, &label.into()) } else { ProgressBar::hidden() };
        Self { pb }
    }
    pub fn spinner(enabled: bool, label: impl Into<String>) -> Self {
        let pb = if enabled { make_spinner(&label.into()) } else { ProgressBar::hidden() };
        Self { pb }
    }
    #[inline] pub fn inc(&self, delta: u64) { self.pb.inc(delta); }
    pub fn set_message(&self, msg: impl Into<String>) { self.pb.set_message(msg.into()); }
    pub fn finish(&self, msg: impl Into<String>) { self.pb.finish_with_message(msg.into()); }
}
