//! Terminal progress for the three load phases.
//!
//! Each phase owns one [`PhaseProgress`]: an indicatif bar for row loops, a
//! spinner for single steps. With `--log-only` nothing is drawn and row
//! loops report through tracing every [`LOG_INTERVAL`] rows instead.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;

static LOG_ONLY: AtomicBool = AtomicBool::new(false);

/// Rows between two log lines in log-only mode
pub const LOG_INTERVAL: u64 = 1_000;

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// A log line is due every `interval` rows and on the last row.
fn should_log(done: u64, total: u64, interval: u64) -> bool {
    total > 0 && interval > 0 && (done % interval == 0 || done == total)
}

pub struct PhaseProgress {
    phase: &'static str,
    bar: ProgressBar,
    done: u64,
    total: u64,
}

impl PhaseProgress {
    /// Counted phase over `total` rows.
    pub fn rows(phase: &'static str, total: u64) -> Self {
        let bar = ProgressBar::new(total);
        if is_log_only() {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        } else if let Ok(style) =
            ProgressStyle::default_bar().template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, ETA: {eta})")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(phase);
        Self { phase, bar, done: 0, total }
    }

    /// Single step without a row count.
    pub fn step(phase: &'static str) -> Self {
        let bar = ProgressBar::new_spinner();
        if is_log_only() {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        } else {
            if let Ok(style) = ProgressStyle::default_spinner().template("{msg} {spinner} [{elapsed_precise}]") {
                bar.set_style(style);
            }
            bar.enable_steady_tick(Duration::from_millis(100));
        }
        bar.set_message(phase);
        Self { phase, bar, done: 0, total: 0 }
    }

    /// One row done.
    pub fn inc(&mut self) {
        self.done += 1;
        self.bar.inc(1);
        if is_log_only() && should_log(self.done, self.total, LOG_INTERVAL) {
            let pct = 100.0 * self.done as f64 / self.total as f64;
            info!(phase = self.phase, done = self.done, total = self.total, "{:.1}%", pct);
        }
    }

    pub fn done(&self) -> u64 {
        self.done
    }

    pub fn finish(self, msg: String) {
        if is_log_only() {
            info!(phase = self.phase, "{}", msg);
        }
        self.bar.finish_with_message(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_log_on_interval_and_last_row() {
        assert!(!should_log(1, 2_500, 1_000));
        assert!(should_log(1_000, 2_500, 1_000));
        assert!(should_log(2_000, 2_500, 1_000));
        assert!(!should_log(2_499, 2_500, 1_000));
        assert!(should_log(2_500, 2_500, 1_000));
        assert!(should_log(3, 3, 1_000));
    }

    #[test]
    fn test_should_log_never_for_empty_phase() {
        assert!(!should_log(0, 0, 1_000));
        assert!(!should_log(5, 10, 0));
    }

    #[test]
    fn test_rows_counts_increments() {
        let mut progress = PhaseProgress::rows("Phase 3: Loading ratings", 3);
        progress.inc();
        progress.inc();
        assert_eq!(progress.done(), 2);
        progress.finish("done".to_string());
    }
}
