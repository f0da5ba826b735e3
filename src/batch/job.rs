//! Batch job definitions.

use std::path::PathBuf;

use serde::Serialize;

use crate::error::{ErrorKind, TranscodeError};
use crate::pipeline::ConversionResult;

/// Status of a finished batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    /// Job completed successfully.
    Completed,
    /// Job failed with an error.
    Failed,
    /// Job was cancelled before it ran to completion.
    Cancelled,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// One file of a batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchJob {
    /// Position of the job in discovery order.
    pub id: u64,
    /// Source file path.
    pub source_path: PathBuf,
    /// Output file path.
    pub output_path: PathBuf,
}

impl BatchJob {
    /// Create a new batch job.
    pub fn new(id: u64, source_path: PathBuf, output_path: PathBuf) -> Self {
        Self {
            id,
            source_path,
            output_path,
        }
    }

    /// Get the file name.
    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Failure recorded for a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobError {
    /// Error classification.
    pub kind: String,
    /// Error message.
    pub message: String,
}

impl From<&TranscodeError> for JobError {
    fn from(err: &TranscodeError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Result of a batch job.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    /// The job that was processed.
    pub job: BatchJob,
    /// Final status.
    pub status: JobStatus,
    /// Conversion result (if successful).
    pub conversion: Option<ConversionResult>,
    /// Error (if failed or cancelled).
    pub error: Option<JobError>,
    /// Time taken in milliseconds.
    pub duration_ms: u64,
}

impl JobResult {
    pub(crate) fn finished(
        job: BatchJob,
        outcome: Result<ConversionResult, TranscodeError>,
        duration_ms: u64,
    ) -> Self {
        match outcome {
            Ok(conversion) => Self {
                job,
                status: JobStatus::Completed,
                conversion: Some(conversion),
                error: None,
                duration_ms,
            },
            Err(e) => Self {
                job,
                status: if e.kind() == ErrorKind::Cancelled {
                    JobStatus::Cancelled
                } else {
                    JobStatus::Failed
                },
                error: Some(JobError::from(&e)),
                conversion: None,
                duration_ms,
            },
        }
    }

    /// Check if the job was successful.
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Completed
    }

    /// Get compression ratio if successful.
    pub fn compression_ratio(&self) -> Option<f64> {
        self.conversion.as_ref().map(|r| r.compression_ratio)
    }
}
