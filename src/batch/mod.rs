//! Batch conversion of DICOM directory trees.
//!
//! Each file is an independent conversion. Jobs run on a `rayon` pool and
//! share one [`Converter`], so the codec registry is built once and read
//! from every worker.
//!
//! # Example
//!
//! ```rust,ignore
//! use medimg_transcode::batch::BatchConverter;
//! use medimg_transcode::progress::CallbackProgress;
//!
//! let progress = CallbackProgress::new(|event| println!("{}", event));
//! let batch = BatchConverter::new(converter)
//!     .progress(progress)
//!     .max_parallel(4)
//!     .recursive(true);
//!
//! let report = batch.convert_directory(Path::new("./in"), Path::new("./out"), &request)?;
//! println!("{} of {} converted", report.successful, report.total_files);
//! ```

mod file_discovery;
mod job;

pub use file_discovery::FileDiscovery;
pub use job::{BatchJob, JobError, JobResult, JobStatus};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;

use crate::error::{Result, TranscodeError};
use crate::pipeline::{CancellationToken, ConversionRequest, Converter};
use crate::progress::{NullProgress, ProgressEvent, ProgressHandler};

/// Aggregate outcome of a batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Files discovered.
    pub total_files: usize,
    /// Files converted.
    pub successful: usize,
    /// Files that failed.
    pub failed: usize,
    /// Files skipped after cancellation.
    pub cancelled: usize,
    /// Sum of decoded raster sizes of converted files.
    pub total_original_bytes: usize,
    /// Sum of output pixel data sizes of converted files.
    pub total_encoded_bytes: usize,
    /// Wall-clock time in milliseconds.
    pub total_time_ms: u64,
    /// Per-file results in discovery order.
    pub jobs: Vec<JobResult>,
}

impl BatchReport {
    fn from_results(jobs: Vec<JobResult>, total_time_ms: u64) -> Self {
        let mut report = BatchReport {
            total_files: jobs.len(),
            total_time_ms,
            ..Default::default()
        };
        for result in &jobs {
            match result.status {
                JobStatus::Completed => report.successful += 1,
                JobStatus::Failed => report.failed += 1,
                JobStatus::Cancelled => report.cancelled += 1,
            }
            if let Some(ref conversion) = result.conversion {
                report.total_original_bytes += conversion.original_size;
                report.total_encoded_bytes += conversion.encoded_size;
            }
        }
        report.jobs = jobs;
        report
    }

    /// Overall compression ratio of converted files.
    pub fn overall_ratio(&self) -> f64 {
        if self.total_encoded_bytes == 0 {
            0.0
        } else {
            self.total_original_bytes as f64 / self.total_encoded_bytes as f64
        }
    }

    /// `BatchFailed` unless every file converted.
    pub fn ensure_success(&self) -> Result<()> {
        let unsuccessful = self.failed + self.cancelled;
        if unsuccessful > 0 {
            return Err(TranscodeError::BatchFailed {
                failed: unsuccessful,
                total: self.total_files,
            });
        }
        Ok(())
    }
}

/// Runs conversions in parallel over a directory tree.
pub struct BatchConverter<P: ProgressHandler = NullProgress> {
    converter: Converter,
    progress: P,
    max_parallel: usize,
    recursive: bool,
    patterns: Vec<String>,
}

impl BatchConverter<NullProgress> {
    /// Create a batch converter without progress reporting.
    pub fn new(converter: Converter) -> Self {
        Self {
            converter,
            progress: NullProgress,
            max_parallel: num_cpus::get(),
            recursive: false,
            patterns: vec!["*.dcm".to_string()],
        }
    }
}

impl<P: ProgressHandler> BatchConverter<P> {
    /// Replace the progress handler.
    pub fn progress<Q: ProgressHandler>(self, progress: Q) -> BatchConverter<Q> {
        BatchConverter {
            converter: self.converter,
            progress,
            max_parallel: self.max_parallel,
            recursive: self.recursive,
            patterns: self.patterns,
        }
    }

    /// Set maximum parallel jobs.
    pub fn max_parallel(mut self, n: usize) -> Self {
        self.max_parallel = n.max(1);
        self
    }

    /// Enable recursive directory scanning.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Set file name patterns; an empty list matches every file.
    pub fn patterns(mut self, patterns: Vec<String>) -> Self {
        self.patterns = patterns;
        self
    }

    /// Token that stops jobs which have not yet encoded.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.converter.cancellation_token()
    }

    /// Convert every matching file under `input_dir`, mirroring the tree into `output_dir`.
    pub fn convert_directory(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        request: &ConversionRequest,
    ) -> Result<BatchReport> {
        let files = FileDiscovery::new()
            .recursive(self.recursive)
            .patterns(self.patterns.clone())
            .discover(input_dir)?;

        if files.is_empty() {
            return Err(TranscodeError::Config(format!(
                "No matching files found in {}",
                input_dir.display()
            )));
        }
        log::info!(
            "Found {} files in {}, converting to {}",
            files.len(),
            input_dir.display(),
            request.target
        );

        let jobs = files
            .into_iter()
            .enumerate()
            .map(|(idx, source)| {
                let output = mirrored_path(&source, input_dir, output_dir);
                BatchJob::new(idx as u64, source, output)
            })
            .collect();
        self.convert_jobs(jobs, request)
    }

    /// Run the given jobs.
    pub fn convert_jobs(&self, jobs: Vec<BatchJob>, request: &ConversionRequest) -> Result<BatchReport> {
        let start_time = Instant::now();
        let total = jobs.len();
        let completed = AtomicUsize::new(0);
        let cancel = self.converter.cancellation_token();

        self.progress.on_start(total);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_parallel)
            .build()
            .map_err(|e| TranscodeError::Config(format!("cannot build thread pool: {}", e)))?;

        let results: Vec<JobResult> = pool.install(|| {
            jobs.into_par_iter()
                .map(|job| {
                    let result = if cancel.is_cancelled() {
                        JobResult::finished(job, Err(TranscodeError::Cancelled), 0)
                    } else {
                        self.run_job(job, request)
                    };

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    self.progress.on_progress(&ProgressEvent {
                        current_file: result.job.source_path.clone(),
                        completed_files: done,
                        total_files: total,
                        status: result.status,
                        message: match (&result.conversion, &result.error) {
                            (Some(c), _) => format!(
                                "{} (ratio: {:.2}:1)",
                                result.job.file_name(),
                                c.compression_ratio
                            ),
                            (None, Some(e)) => format!("{}: {}", result.job.file_name(), e.message),
                            (None, None) => result.job.file_name(),
                        },
                    });
                    result
                })
                .collect()
        });

        let report = BatchReport::from_results(results, start_time.elapsed().as_millis() as u64);
        log::info!(
            "Batch finished: {} converted, {} failed, {} cancelled in {} ms",
            report.successful,
            report.failed,
            report.cancelled,
            report.total_time_ms
        );
        self.progress.on_complete(&report);
        Ok(report)
    }

    fn run_job(&self, job: BatchJob, request: &ConversionRequest) -> JobResult {
        let start = Instant::now();

        let outcome = match job.output_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
                .map_err(|e| TranscodeError::write(parent, e)),
            _ => Ok(()),
        }
        .and_then(|()| self.converter.convert(&job.source_path, &job.output_path, request));

        if let Err(ref e) = outcome {
            log::warn!("Failed to convert {}: {}", job.source_path.display(), e);
        }
        JobResult::finished(job, outcome, start.elapsed().as_millis() as u64)
    }
}

/// Output location of `file` when `input_dir` is mirrored into `output_dir`.
fn mirrored_path(file: &Path, input_dir: &Path, output_dir: &Path) -> PathBuf {
    match file.strip_prefix(input_dir) {
        Ok(relative) => output_dir.join(relative),
        Err(_) => output_dir.join(file.file_name().unwrap_or(file.as_os_str())),
    }
}
