//! Transfer syntax conversion pipeline.
//!
//! A conversion parses the input, decodes its pixel data with the codec for
//! the declared syntax, re-encodes it with the codec for the target syntax
//! and writes the result. Every element other than the Transfer Syntax UID
//! and Pixel Data is carried over unchanged.

mod state;

pub use state::ConversionState;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dicom_core::VR;
use serde::Serialize;

use crate::codec::{CodecRegistry, PixelCodec, PixelData};
use crate::config::{CodecParameters, ConversionConfig, TransferSyntax, WriteMode};
use crate::dicom::{DicomFile, PixelDescription, Value};
use crate::error::{Result, TranscodeError};
use crate::metrics::calculate_psnr;
use crate::RasterBuffer;

use state::StateTrace;

/// Shared flag used to stop conversions before they encode.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// New, not yet cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Target of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionRequest {
    /// Transfer syntax to convert to.
    pub target: TransferSyntax,
    /// Codec parameters for the encode step.
    pub params: CodecParameters,
}

impl ConversionRequest {
    /// Create a request.
    pub fn new(target: TransferSyntax, params: CodecParameters) -> Self {
        Self { target, params }
    }

    /// Build a request from configuration.
    pub fn from_config(config: &ConversionConfig) -> Result<Self> {
        Ok(Self::new(config.target_syntax, config.codec_parameters()?))
    }
}

impl Default for ConversionRequest {
    /// JPEG Baseline, lossy, quality 50.
    fn default() -> Self {
        Self::new(TransferSyntax::JpegBaseline, CodecParameters::default())
    }
}

/// Result of a conversion operation.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    /// Input file path (none for in-memory conversions).
    pub source_path: Option<PathBuf>,
    /// Output file path (none for in-memory conversions).
    pub output_path: Option<PathBuf>,
    /// Declared syntax of the input.
    pub source_syntax: TransferSyntax,
    /// Syntax of the output.
    pub target_syntax: TransferSyntax,
    /// Codec used for the encode step.
    pub codec_name: String,
    /// Size of the decoded raster in native encoding, in bytes.
    pub original_size: usize,
    /// Size of the stored output pixel data, in bytes.
    pub encoded_size: usize,
    /// `original_size / encoded_size`.
    pub compression_ratio: f64,
    /// Whether lossless encoding was requested.
    pub lossless: bool,
    /// Quality used for lossy encoding.
    pub quality: Option<u8>,
    /// Whether the pixel data was copied without re-encoding.
    pub passthrough: bool,
    /// PSNR of the re-decoded output, when verification ran on a lossy target.
    pub psnr_db: Option<f64>,
    /// Time taken in milliseconds.
    pub elapsed_ms: u64,
}

impl ConversionResult {
    /// Calculate space savings as percentage.
    pub fn space_savings_percent(&self) -> f64 {
        if self.original_size == 0 {
            0.0
        } else {
            (1.0 - (self.encoded_size as f64 / self.original_size as f64)) * 100.0
        }
    }
}

/// Pixel data encoded for the target, ready to be placed into the output file.
struct Transcoded {
    file: DicomFile,
    result: ConversionResult,
}

/// Converts DICOM files between transfer syntaxes.
///
/// Cheap to clone; clones share the codec registry and cancellation token.
#[derive(Debug, Clone)]
pub struct Converter {
    registry: Arc<CodecRegistry>,
    write_mode: WriteMode,
    verify: bool,
    cancel: CancellationToken,
}

impl Converter {
    /// Create a converter that resolves codecs from `registry`.
    pub fn new(registry: Arc<CodecRegistry>) -> Self {
        Self {
            registry,
            write_mode: WriteMode::default(),
            verify: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Create a converter with the write mode and verification from `config`.
    pub fn from_config(registry: Arc<CodecRegistry>, config: &ConversionConfig) -> Self {
        Self::new(registry)
            .write_mode(config.write_mode)
            .verify(config.verify)
    }

    /// Set how output files are placed.
    pub fn write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    /// Enable or disable decode-after-encode verification.
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Use a shared cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token shared by this converter and its clones.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The registry codecs are resolved from.
    pub fn registry(&self) -> &CodecRegistry {
        &self.registry
    }

    /// Convert `input` to `output` as described by `request`.
    pub fn convert<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
        request: &ConversionRequest,
    ) -> Result<ConversionResult> {
        self.convert_traced(input, output, request).0
    }

    /// Like [`Converter::convert`], also returning every state visited.
    pub fn convert_traced<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
        request: &ConversionRequest,
    ) -> (Result<ConversionResult>, Vec<ConversionState>) {
        let input = input.as_ref();
        let output = output.as_ref();
        let mut trace = StateTrace::new();

        log::info!("Processing: {}", input.display());
        let outcome = self.run(input, output, request, &mut trace);
        match &outcome {
            Ok(result) => log::info!(
                "Converted {} -> {} ({} to {}, ratio {:.2}:1)",
                input.display(),
                output.display(),
                result.source_syntax,
                result.target_syntax,
                result.compression_ratio
            ),
            Err(e) => {
                log::debug!(
                    "Conversion of {} failed in state {}: {}",
                    input.display(),
                    trace.current(),
                    e
                );
                trace.fail();
            }
        }
        (outcome, trace.into_states())
    }

    /// Convert a parsed file in memory, returning the converted file.
    pub fn convert_file(
        &self,
        file: &DicomFile,
        request: &ConversionRequest,
    ) -> Result<(DicomFile, ConversionResult)> {
        let mut trace = StateTrace::new();
        let start = Instant::now();
        let source = self.registry.resolve(file.transfer_syntax())?;
        trace.advance(ConversionState::SourceResolved);

        let mut transcoded = self.transcode(file.clone(), source, request, &mut trace)?;
        transcoded.result.elapsed_ms = start.elapsed().as_millis() as u64;
        Ok((transcoded.file, transcoded.result))
    }

    fn run(
        &self,
        input: &Path,
        output: &Path,
        request: &ConversionRequest,
        trace: &mut StateTrace,
    ) -> Result<ConversionResult> {
        let start = Instant::now();

        let file = DicomFile::open(input)?;
        let source = self.registry.resolve(file.transfer_syntax())?;
        trace.advance(ConversionState::SourceResolved);

        let Transcoded { file, mut result } = self.transcode(file, source, request, trace)?;

        file.write_to_file(output, self.write_mode)?;
        trace.advance(ConversionState::Written);
        trace.advance(ConversionState::Done);

        result.source_path = Some(input.to_path_buf());
        result.output_path = Some(output.to_path_buf());
        result.elapsed_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    /// SourceResolved through Encoded: decode, check, encode and rewrite the file.
    fn transcode(
        &self,
        mut file: DicomFile,
        source: Arc<dyn PixelCodec>,
        request: &ConversionRequest,
        trace: &mut StateTrace,
    ) -> Result<Transcoded> {
        let source_syntax = file.transfer_syntax();
        let description = PixelDescription::from_dataset(&file.dataset)?;
        description.ensure_supported()?;

        let stored = stored_pixel_data(&file)?;
        let raster = source.decode(&stored, &description)?;
        raster.validate()?;
        trace.advance(ConversionState::Decoded);

        let target = self.registry.resolve(request.target)?;
        target.check_parameters(&request.params)?;
        if !target.can_encode(&raster) {
            return Err(TranscodeError::UnsupportedPixelFormat(format!(
                "{} cannot encode {}-bit{} images with {} samples per pixel",
                target.info().name,
                raster.bits_allocated,
                if raster.signed { " signed" } else { "" },
                raster.samples_per_pixel
            )));
        }
        if self.cancel.is_cancelled() {
            return Err(TranscodeError::Cancelled);
        }
        trace.advance(ConversionState::TargetResolved);

        let passthrough = source_syntax == request.target;
        let encoded = if passthrough {
            log::debug!("Source already uses {}, copying pixel data", source_syntax);
            stored
        } else {
            target.encode(&raster, &description, &request.params)?
        };

        let psnr_db = if self.verify {
            self.verify_encoding(target.as_ref(), &encoded, &description, &raster, &request.params)?
        } else {
            None
        };
        trace.advance(ConversionState::Encoded);

        let original_size = raster.expected_len() * description.bytes_per_sample();
        let encoded_size = encoded.len();

        // a passthrough keeps the original Pixel Data element as is
        if !passthrough {
            let (vr, value) = match encoded {
                PixelData::Encapsulated(data) => (VR::OB, Value::Fragments(data)),
                PixelData::Native(bytes) if description.bits_allocated > 8 => {
                    (VR::OW, Value::Bytes(bytes))
                }
                PixelData::Native(bytes) => (VR::OB, Value::Bytes(bytes)),
            };
            file.set_transfer_syntax(request.target);
            file.set_pixel_data(vr, value);
        }

        Ok(Transcoded {
            file,
            result: ConversionResult {
                source_path: None,
                output_path: None,
                source_syntax,
                target_syntax: request.target,
                codec_name: target.info().name.to_string(),
                original_size,
                encoded_size,
                compression_ratio: original_size as f64 / encoded_size.max(1) as f64,
                lossless: request.params.is_lossless(),
                quality: request.params.quality(),
                passthrough,
                psnr_db,
                elapsed_ms: 0,
            },
        })
    }

    /// Decode the encoded pixel data again and compare it with the source raster.
    fn verify_encoding(
        &self,
        codec: &dyn PixelCodec,
        encoded: &PixelData,
        description: &PixelDescription,
        original: &RasterBuffer,
        params: &CodecParameters,
    ) -> Result<Option<f64>> {
        let decoded = codec.decode(encoded, description)?;

        if params.is_lossless() {
            if decoded.interleaved_samples() != original.interleaved_samples() {
                return Err(TranscodeError::CorruptPixelData(
                    "Lossless verification failed: decoded data differs from original".into(),
                ));
            }
            log::debug!("Lossless verification passed");
            return Ok(None);
        }

        let psnr = calculate_psnr(original, &decoded)?;
        log::debug!("Lossy verification: {}", psnr);
        Ok(Some(psnr.psnr_db))
    }
}

/// Value of the top-level Pixel Data element as codec input.
fn stored_pixel_data(file: &DicomFile) -> Result<PixelData> {
    match &file.pixel_data()?.value {
        Value::Bytes(bytes) => Ok(PixelData::Native(bytes.clone())),
        Value::Fragments(data) => Ok(PixelData::Encapsulated(data.clone())),
        Value::Sequence { .. } => Err(TranscodeError::MalformedContainer(
            "Pixel Data is encoded as a sequence".into(),
        )),
    }
}
