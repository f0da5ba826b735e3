//! Codec trait definitions.

use crate::config::CodecParameters;
use crate::dicom::{EncapsulatedPixelData, PixelDescription};
use crate::error::{Result, TranscodeError};
use crate::RasterBuffer;

/// Which compression modes a codec offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionSupport {
    /// Only bit-exact encoding.
    LosslessOnly,
    /// Only lossy encoding.
    LossyOnly,
    /// Both lossless and lossy encoding.
    Both,
}

impl CompressionSupport {
    /// Whether lossless encoding is offered.
    pub fn supports_lossless(&self) -> bool {
        !matches!(self, Self::LossyOnly)
    }

    /// Whether lossy encoding is offered.
    pub fn supports_lossy(&self) -> bool {
        !matches!(self, Self::LosslessOnly)
    }
}

/// Information about a codec.
#[derive(Debug, Clone)]
pub struct CodecInfo {
    /// Human-readable codec name.
    pub name: &'static str,
    /// Compression modes offered.
    pub mode: CompressionSupport,
    /// Whether the codec accepts a quality parameter.
    pub supports_quality: bool,
}

/// Codec capabilities for image formats.
#[derive(Debug, Clone)]
pub struct CodecCapabilities {
    /// Maximum supported bits allocated per sample.
    pub max_bits_per_sample: u16,
    /// Whether signed pixel values are supported.
    pub supports_signed: bool,
    /// Whether color images are supported.
    pub supports_color: bool,
}

/// Pixel Data value as stored in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixelData {
    /// Native (uncompressed) little-endian samples.
    Native(Vec<u8>),
    /// Compressed frame fragments.
    Encapsulated(EncapsulatedPixelData),
}

impl PixelData {
    /// Number of value bytes, excluding item headers.
    pub fn len(&self) -> usize {
        match self {
            PixelData::Native(bytes) => bytes.len(),
            PixelData::Encapsulated(data) => {
                data.offset_table.len() + data.fragments.iter().map(Vec::len).sum::<usize>()
            }
        }
    }

    /// Whether no pixel bytes are present.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes of the single frame held in an encapsulated value.
    pub(crate) fn frame(&self, codec: &str) -> Result<std::borrow::Cow<'_, [u8]>> {
        match self {
            PixelData::Encapsulated(data) if !data.fragments.is_empty() => Ok(data.frame_bytes()),
            PixelData::Encapsulated(_) => Err(TranscodeError::CorruptPixelData(format!(
                "{}: encapsulated pixel data has no fragments",
                codec
            ))),
            PixelData::Native(_) => Err(TranscodeError::CorruptPixelData(format!(
                "{}: expected encapsulated pixel data, found native",
                codec
            ))),
        }
    }
}

/// Trait for pixel data codecs.
pub trait PixelCodec: Send + Sync {
    /// Decode stored pixel data into a raster.
    fn decode(&self, data: &PixelData, description: &PixelDescription) -> Result<RasterBuffer>;

    /// Encode a raster into stored pixel data.
    fn encode(
        &self,
        raster: &RasterBuffer,
        description: &PixelDescription,
        params: &CodecParameters,
    ) -> Result<PixelData>;

    /// Get codec information.
    fn info(&self) -> CodecInfo;

    /// Get codec capabilities.
    fn capabilities(&self) -> CodecCapabilities;

    /// Verify that the codec can handle the given raster.
    fn can_encode(&self, raster: &RasterBuffer) -> bool {
        let caps = self.capabilities();
        raster.bits_allocated <= caps.max_bits_per_sample
            && (raster.samples_per_pixel == 1 || caps.supports_color)
            && (!raster.signed || caps.supports_signed)
    }

    /// Check the requested parameters against the codec's mode.
    fn check_parameters(&self, params: &CodecParameters) -> Result<()> {
        let info = self.info();

        if params.is_lossless() && params.quality().is_some() {
            return Err(TranscodeError::IncompatibleParameters(format!(
                "{}: a quality value cannot be combined with lossless encoding",
                info.name
            )));
        }
        if !params.is_lossless() && !info.mode.supports_lossy() {
            return Err(TranscodeError::IncompatibleParameters(format!(
                "{} is lossless-only but lossy encoding was requested",
                info.name
            )));
        }
        if params.is_lossless() && !info.mode.supports_lossless() {
            return Err(TranscodeError::IncompatibleParameters(format!(
                "{} is lossy-only but lossless encoding was requested",
                info.name
            )));
        }
        if params.quality().is_some() && !info.supports_quality {
            return Err(TranscodeError::InvalidParameter(format!(
                "{} does not accept a quality parameter",
                info.name
            )));
        }
        Ok(())
    }
}
