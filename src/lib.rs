//! DICOM Transfer Syntax Conversion Library
//!
//! Reads DICOM Part 10 files, decodes their pixel data with the codec
//! registered for the declared transfer syntax, re-encodes it with the codec
//! for the requested target syntax and writes the result back, leaving every
//! other element untouched.
//!
//! # Supported transfer syntaxes
//!
//! - **Implicit / Explicit VR Little Endian**: native pixel data
//! - **JPEG Baseline (Process 1)**: lossy, 8-bit, quality 0-100
//! - **JPEG Lossless (Process 14, SV1)**: bit-exact
//! - **RLE Lossless**: bit-exact
//!
//! JPEG Extended, JPEG-LS and JPEG 2000 files are recognized and parsed, but
//! have no codec in the default registry.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use medimg_transcode::{CodecParameters, CodecRegistry, ConversionRequest, Converter, TransferSyntax};
//!
//! let converter = Converter::new(Arc::new(CodecRegistry::with_defaults()));
//! let request = ConversionRequest::new(TransferSyntax::JpegBaseline, CodecParameters::lossy(50)?);
//! let result = converter.convert("input.dcm", "output.dcm", &request)?;
//! println!("Compression ratio: {:.2}:1", result.compression_ratio);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod cli;
pub mod codec;
pub mod config;
pub mod dicom;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod progress;

#[cfg(test)]
pub(crate) mod test_support;

use std::borrow::Cow;

// Re-export commonly used types
pub use codec::{CodecInfo, CodecRegistry, PixelCodec, PixelData};
pub use config::{CodecParameters, ConversionConfig, TransferSyntax, WriteMode};
pub use dicom::{Dataset, DicomFile, Element, PixelDescription, Value};
pub use error::{ErrorKind, Result, TranscodeError};
pub use pipeline::{
    CancellationToken, ConversionRequest, ConversionResult, ConversionState, Converter,
};

/// Arrangement of samples of multi-sample pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleLayout {
    /// `R1 G1 B1 R2 G2 B2 ...`
    Interleaved,
    /// `R1 R2 ... G1 G2 ... B1 B2 ...`
    Planar,
}

/// Decoded pixel matrix exchanged between the decode and encode steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterBuffer {
    /// Image width in pixels (Columns).
    pub width: u32,
    /// Image height in pixels (Rows).
    pub height: u32,
    /// Bits allocated per sample (8 or 16).
    pub bits_allocated: u16,
    /// Bits stored per sample.
    pub bits_stored: u16,
    /// Samples per pixel (1 for grayscale, 3 for colour).
    pub samples_per_pixel: u16,
    /// Whether sample values are two's complement.
    pub signed: bool,
    /// Sample arrangement.
    pub layout: SampleLayout,
    /// Sample values; signed values are kept as their bit patterns.
    pub samples: Vec<u16>,
}

impl RasterBuffer {
    /// Create an unsigned, interleaved raster with `bits_stored == bits_allocated`.
    pub fn new(
        width: u32,
        height: u32,
        bits_allocated: u16,
        samples_per_pixel: u16,
        samples: Vec<u16>,
    ) -> Self {
        Self {
            width,
            height,
            bits_allocated,
            bits_stored: bits_allocated,
            samples_per_pixel,
            signed: false,
            layout: SampleLayout::Interleaved,
            samples,
        }
    }

    /// Number of pixels.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Number of samples the buffer must hold.
    pub fn expected_len(&self) -> usize {
        self.pixel_count() * self.samples_per_pixel as usize
    }

    /// Validate geometry and sample count.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 || self.samples_per_pixel == 0 {
            return Err(TranscodeError::UnsupportedPixelFormat(format!(
                "degenerate raster {}x{} with {} samples per pixel",
                self.width, self.height, self.samples_per_pixel
            )));
        }
        if self.bits_allocated == 0
            || self.bits_allocated > 16
            || self.bits_stored == 0
            || self.bits_stored > self.bits_allocated
        {
            return Err(TranscodeError::UnsupportedPixelFormat(format!(
                "bits stored {} / allocated {}",
                self.bits_stored, self.bits_allocated
            )));
        }
        if self.samples.len() != self.expected_len() {
            return Err(TranscodeError::CorruptPixelData(format!(
                "raster holds {} samples, expected {}",
                self.samples.len(),
                self.expected_len()
            )));
        }
        Ok(())
    }

    /// Samples in interleaved order, converting from planar when needed.
    pub fn interleaved_samples(&self) -> Cow<'_, [u16]> {
        if self.layout == SampleLayout::Interleaved || self.samples_per_pixel == 1 {
            Cow::Borrowed(&self.samples)
        } else {
            Cow::Owned(self.to_layout(SampleLayout::Interleaved).samples)
        }
    }

    /// Copy of this raster rearranged to the requested layout.
    pub fn to_layout(&self, layout: SampleLayout) -> RasterBuffer {
        let spp = self.samples_per_pixel as usize;
        if layout == self.layout || spp == 1 {
            return RasterBuffer {
                layout,
                ..self.clone()
            };
        }

        let pixels = self.pixel_count();
        let mut samples = vec![0u16; self.samples.len()];
        for p in 0..pixels {
            for c in 0..spp {
                let interleaved = p * spp + c;
                let planar = c * pixels + p;
                match layout {
                    SampleLayout::Interleaved => samples[interleaved] = self.samples[planar],
                    SampleLayout::Planar => samples[planar] = self.samples[interleaved],
                }
            }
        }

        RasterBuffer {
            layout,
            samples,
            ..self.clone()
        }
    }

    /// Whether both rasters share dimensions and sample format.
    pub fn same_geometry(&self, other: &RasterBuffer) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.bits_allocated == other.bits_allocated
            && self.samples_per_pixel == other.samples_per_pixel
    }

    /// Largest value representable with the stored bits.
    pub fn max_value(&self) -> u32 {
        (1u32 << self.bits_stored) - 1
    }

    /// Mean sample value.
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|&s| f64::from(s)).sum::<f64>() / self.samples.len() as f64
    }
}

/// Library version information.
pub mod version {
    /// Library version string.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Library name.
    pub const NAME: &str = env!("CARGO_PKG_NAME");

    /// Get full version string.
    pub fn full_version() -> String {
        format!("{} {}", NAME, VERSION)
    }
}
