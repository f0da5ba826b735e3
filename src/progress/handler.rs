//! Progress handler trait and related types.

use std::path::PathBuf;

use crate::batch::{BatchReport, JobStatus};

/// Emitted each time a batch job finishes.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// File the job converted.
    pub current_file: PathBuf,
    /// Jobs finished so far, including this one.
    pub completed_files: usize,
    /// Jobs in the batch.
    pub total_files: usize,
    /// Final status of the job.
    pub status: JobStatus,
    /// Status message.
    pub message: String,
}

impl ProgressEvent {
    /// Fraction of jobs finished (0.0 to 1.0).
    pub fn overall_progress(&self) -> f64 {
        if self.total_files == 0 {
            1.0
        } else {
            self.completed_files as f64 / self.total_files as f64
        }
    }
}

impl std::fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}/{}] {}: {}",
            self.completed_files, self.total_files, self.status, self.message
        )
    }
}

/// Receives batch progress. Called from worker threads.
pub trait ProgressHandler: Send + Sync {
    /// Called once with the number of discovered files.
    fn on_start(&self, _total_files: usize) {}

    /// Called after every finished job.
    fn on_progress(&self, event: &ProgressEvent);

    /// Called after the last job.
    fn on_complete(&self, _report: &BatchReport) {}
}

/// Ignores all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressHandler for NullProgress {
    fn on_progress(&self, _event: &ProgressEvent) {}
}
