//! Terminal progress bar.

use indicatif::{ProgressBar, ProgressStyle};

use crate::batch::{BatchReport, JobStatus};

use super::handler::{ProgressEvent, ProgressHandler};

const TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// Draws an `indicatif` bar on stderr.
#[derive(Debug, Clone)]
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    /// Create a bar; its length is set in `on_start`.
    pub fn new() -> Self {
        let style = ProgressStyle::with_template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        let bar = ProgressBar::new(0);
        bar.set_style(style);
        Self { bar }
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressHandler for BarProgress {
    fn on_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
    }

    fn on_progress(&self, event: &ProgressEvent) {
        if event.status != JobStatus::Completed {
            self.bar
                .println(format!("{}: {}", event.current_file.display(), event.message));
        }
        self.bar.set_message(event.message.clone());
        self.bar.inc(1);
    }

    fn on_complete(&self, report: &BatchReport) {
        self.bar.finish_with_message(format!(
            "{} converted, {} failed",
            report.successful, report.failed
        ));
    }
}
