//! Command-line interface for the transfer syntax converter.

use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::batch::{BatchConverter, BatchReport};
use crate::codec::CodecRegistry;
use crate::config::{ConversionConfig, QualitySetting, TransferSyntax, WriteMode};
use crate::error::{Result, TranscodeError};
use crate::pipeline::{ConversionRequest, ConversionResult, Converter};
use crate::progress::{BarProgress, ProgressHandler};

/// DICOM transfer syntax converter
///
/// Re-encodes the pixel data of a DICOM file (or a directory of files) into
/// another transfer syntax. Without options the output is JPEG Baseline at
/// quality 50.
#[derive(Parser, Debug)]
#[command(name = "medimg_transcode")]
#[command(version)]
#[command(about = "Convert DICOM files between transfer syntaxes")]
pub struct Cli {
    /// Input DICOM file or directory
    pub input: PathBuf,

    /// Output DICOM file or directory
    pub output: PathBuf,

    /// Target transfer syntax [default: jpeg-baseline]
    #[arg(short, long, value_enum)]
    pub transfer_syntax: Option<SyntaxArg>,

    /// Request lossless encoding
    #[arg(long)]
    pub lossless: bool,

    /// Lossy quality, 0-100 [default: 50]
    #[arg(short = 'Q', long)]
    pub quality: Option<String>,

    /// TOML configuration file; command-line options take precedence
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the output file in place instead of through a temporary file
    #[arg(long)]
    pub direct_write: bool,

    /// Decode the encoded pixel data again and compare it with the source
    #[arg(long)]
    pub verify: bool,

    /// Descend into subdirectories when INPUT is a directory
    #[arg(short, long)]
    pub recursive: bool,

    /// Number of parallel conversions in directory mode
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Write a JSON conversion report to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Transfer syntax argument.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyntaxArg {
    /// Implicit VR Little Endian
    #[value(name = "implicit-le")]
    ImplicitLe,
    /// Explicit VR Little Endian
    #[value(name = "explicit-le")]
    ExplicitLe,
    /// JPEG Baseline (lossy, 8-bit)
    #[value(name = "jpeg-baseline")]
    JpegBaseline,
    /// JPEG Extended
    #[value(name = "jpeg-extended")]
    JpegExtended,
    /// JPEG Lossless, Process 14
    #[value(name = "jpeg-lossless")]
    JpegLossless,
    /// JPEG Lossless, first-order prediction
    #[value(name = "jpeg-lossless-sv1")]
    JpegLosslessSv1,
    /// JPEG-LS Lossless
    #[value(name = "jpeg-ls-lossless")]
    JpegLsLossless,
    /// JPEG-LS Near-Lossless
    #[value(name = "jpeg-ls-near-lossless")]
    JpegLsNearLossless,
    /// JPEG 2000 Lossless
    #[value(name = "jpeg2000-lossless")]
    Jpeg2000Lossless,
    /// JPEG 2000
    #[value(name = "jpeg2000")]
    Jpeg2000,
    /// RLE Lossless
    #[value(name = "rle")]
    Rle,
}

impl From<SyntaxArg> for TransferSyntax {
    fn from(arg: SyntaxArg) -> Self {
        match arg {
            SyntaxArg::ImplicitLe => TransferSyntax::ImplicitVrLittleEndian,
            SyntaxArg::ExplicitLe => TransferSyntax::ExplicitVrLittleEndian,
            SyntaxArg::JpegBaseline => TransferSyntax::JpegBaseline,
            SyntaxArg::JpegExtended => TransferSyntax::JpegExtended,
            SyntaxArg::JpegLossless => TransferSyntax::JpegLossless,
            SyntaxArg::JpegLosslessSv1 => TransferSyntax::JpegLosslessSv1,
            SyntaxArg::JpegLsLossless => TransferSyntax::JpegLsLossless,
            SyntaxArg::JpegLsNearLossless => TransferSyntax::JpegLsNearLossless,
            SyntaxArg::Jpeg2000Lossless => TransferSyntax::Jpeg2000Lossless,
            SyntaxArg::Jpeg2000 => TransferSyntax::Jpeg2000,
            SyntaxArg::Rle => TransferSyntax::RleLossless,
        }
    }
}

/// Run the CLI application.
///
/// Failures are logged with their kind before being returned.
pub fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose, cli.quiet);

    execute(&cli).map_err(|e| {
        log::error!("[{}] {}", e.kind(), e);
        e
    })
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "info"
    };
    // a logger may already be installed when run is called repeatedly
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .try_init();
}

fn execute(cli: &Cli) -> Result<()> {
    let config = resolve_config(cli)?;
    let request = ConversionRequest::from_config(&config)?;
    let converter = Converter::from_config(Arc::new(CodecRegistry::with_defaults()), &config);

    if cli.input.is_dir() {
        let batch = BatchConverter::new(converter)
            .recursive(cli.recursive)
            .max_parallel(cli.jobs.unwrap_or_else(num_cpus::get));
        let report = if cli.quiet {
            run_batch(&batch, cli, &request)?
        } else {
            run_batch(&batch.progress(BarProgress::new()), cli, &request)?
        };
        if !cli.quiet {
            print_batch_report(&report);
        }
        report.ensure_success()
    } else {
        let result = converter.convert(&cli.input, &cli.output, &request)?;
        if let Some(ref path) = cli.report {
            write_report(path, &result)?;
        }
        if !cli.quiet {
            print_conversion_result(&result);
        }
        Ok(())
    }
}

fn run_batch<P: ProgressHandler>(
    batch: &BatchConverter<P>,
    cli: &Cli,
    request: &ConversionRequest,
) -> Result<BatchReport> {
    let report = batch.convert_directory(&cli.input, &cli.output, request)?;
    if let Some(ref path) = cli.report {
        write_report(path, &report)?;
    }
    Ok(report)
}

/// Configuration from the optional TOML file with command-line overrides applied.
pub fn resolve_config(cli: &Cli) -> Result<ConversionConfig> {
    let mut config = match cli.config {
        Some(ref path) => ConversionConfig::from_toml_file(path)?,
        None => ConversionConfig::default(),
    };

    if let Some(syntax) = cli.transfer_syntax {
        config.target_syntax = syntax.into();
    }
    if cli.lossless {
        config.lossless = true;
    }
    if let Some(ref quality) = cli.quality {
        config.quality = Some(QualitySetting::Text(quality.clone()));
    }
    if cli.direct_write {
        config.write_mode = WriteMode::Direct;
    }
    if cli.verify {
        config.verify = true;
    }
    Ok(config)
}

fn write_report<T: serde::Serialize>(path: &Path, report: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| TranscodeError::Config(format!("cannot serialize report: {}", e)))?;
    std::fs::write(path, json).map_err(|e| TranscodeError::write(path, e))?;
    log::debug!("Report written to {}", path.display());
    Ok(())
}

fn print_conversion_result(result: &ConversionResult) {
    println!("Conversion Result:");
    println!("  Source: {}", result.source_syntax);
    println!("  Target: {}", result.target_syntax);
    println!("  Codec: {}", result.codec_name);
    match (result.lossless, result.quality) {
        (true, _) => println!("  Mode: Lossless"),
        (false, Some(q)) => println!("  Mode: Lossy (quality {})", q),
        (false, None) => println!("  Mode: Lossy"),
    }
    println!("  Original Size: {} bytes", result.original_size);
    println!("  Encoded Size: {} bytes", result.encoded_size);
    println!("  Compression Ratio: {:.2}:1", result.compression_ratio);
    println!("  Space Savings: {:.1}%", result.space_savings_percent());
    if let Some(psnr) = result.psnr_db {
        println!("  PSNR: {:.2} dB", psnr);
    }
    println!("  Time: {} ms", result.elapsed_ms);
}

fn print_batch_report(report: &BatchReport) {
    println!("Batch Result:");
    println!("  Files: {}", report.total_files);
    println!("  Converted: {}", report.successful);
    println!("  Failed: {}", report.failed);
    if report.cancelled > 0 {
        println!("  Cancelled: {}", report.cancelled);
    }
    println!("  Overall Ratio: {:.2}:1", report.overall_ratio());
    println!("  Time: {} ms", report.total_time_ms);
    for job in report.jobs.iter().filter(|j| !j.is_success()) {
        if let Some(ref error) = job.error {
            println!("  - {}: [{}] {}", job.job.source_path.display(), error.kind, error.message);
        }
    }
}
