//! Progress reporting for CLI

use crate::domain::services::GIGABYTE;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

/// Progress reporter using indicatif
///
/// A spinner on stdout tracks the bytes copied so far, and every gigabyte
/// milestone leaves a "Copied N GB" line behind it.
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Creates a spinner drawn on stdout
    pub fn stdout() -> Self {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stdout());
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {bytes} copied ({bytes_per_sec})",
        ) {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        Self::new(bar)
    }

    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }

    /// Records the `gigabytes`-th milestone
    pub fn report(&self, gigabytes: u64) {
        let line = format!("Copied {} GB", gigabytes);
        self.bar.set_position(gigabytes.saturating_mul(GIGABYTE));
        self.bar.set_message(line.clone());
        if self.bar.is_hidden() {
            // Not a terminal: indicatif draws nothing, so print the line plainly.
            println!("{}", line);
        } else {
            self.bar.println(line);
        }
    }

    /// Bytes covered by the milestones reported so far
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_each_milestone() {
        let reporter = ProgressReporter::new(ProgressBar::hidden());
        reporter.report(1);
        assert_eq!(reporter.position(), GIGABYTE);
        reporter.report(2);
        assert_eq!(reporter.position(), 2 * GIGABYTE);
        assert_eq!(reporter.bar.message(), "Copied 2 GB");

        reporter.finish();
        assert!(reporter.bar.is_finished());
    }
}
