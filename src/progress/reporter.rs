//! Transfer progress bar
//!
//! Chunked transfers report a running byte total after every step; the bar
//! shows it with throughput and ETA.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

const BAR_TEMPLATE: &str =
    "{prefix:.bold.dim} [{bar:40.green/white}] {bytes}/{total_bytes} ({bytes_per_sec}, ETA {eta})";

/// Progress display for a single file transfer
pub struct TransferProgress {
    bar: ProgressBar,
    start_time: Instant,
    enabled: bool,
}

impl TransferProgress {
    /// Create a visible bar for a transfer of `total_bytes`
    pub fn new(label: &str, total_bytes: u64) -> Self {
        let bar = ProgressBar::new(total_bytes);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_prefix(label.to_string());

        Self {
            bar,
            start_time: Instant::now(),
            enabled: true,
        }
    }

    /// Create a hidden bar (quiet mode, atomic transfers)
    pub fn disabled(total_bytes: u64) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total_bytes), ProgressDrawTarget::hidden());
        Self {
            bar,
            start_time: Instant::now(),
            enabled: false,
        }
    }

    /// Record the cumulative bytes copied so far
    pub fn update(&self, bytes_copied: u64) {
        self.bar.set_position(bytes_copied);
    }

    /// Bytes shown so far
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Total bytes expected
    pub fn total(&self) -> u64 {
        self.bar.length().unwrap_or(0)
    }

    /// Completion percentage; an empty transfer counts as done once finished
    pub fn percentage(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => (self.position() as f64 / total as f64) * 100.0,
        }
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get current throughput in bytes/second
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.position() as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Finish with a success message
    pub fn finish_success(&self, message: &str) {
        self.bar.finish_with_message(format!("✓ {}", message));
    }

    /// Leave the bar where it stopped
    pub fn finish_error(&self, message: &str) {
        self.bar.abandon_with_message(format!("✗ {}", message));
    }

    /// Check if the bar is drawn
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// One-line summary for the end of a transfer
    pub fn summary_line(&self) -> String {
        format!(
            "{} in {:.1?} ({}/s)",
            humansize::format_size(self.position(), humansize::BINARY),
            self.elapsed(),
            humansize::format_size(self.throughput() as u64, humansize::BINARY)
        )
    }
}
