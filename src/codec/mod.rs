//! Pixel data codecs and the registry that maps transfer syntaxes to them.
//!
//! This module provides the `PixelCodec` trait and implementations for:
//! - Native (uncompressed) little-endian pixel data
//! - JPEG Baseline (via the `image` crate)
//! - JPEG Lossless, Process 14
//! - RLE Lossless

mod jpeg_baseline;
mod jpeg_lossless;
mod rle;
mod traits;

pub use jpeg_baseline::JpegBaselineCodec;
pub use jpeg_lossless::JpegLosslessCodec;
pub use rle::RleLosslessCodec;
pub use traits::{CodecCapabilities, CodecInfo, CompressionSupport, PixelCodec, PixelData};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};

use crate::config::{CodecParameters, TransferSyntax};
use crate::dicom::PixelDescription;
use crate::error::{Result, TranscodeError};
use crate::RasterBuffer;

/// Maps transfer syntaxes to the codec that handles them.
///
/// Built once and shared read-only between converters.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: HashMap<TransferSyntax, Arc<dyn PixelCodec>>,
}

impl CodecRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in codec.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let native: Arc<dyn PixelCodec> = Arc::new(UncompressedCodec);
        let lossless: Arc<dyn PixelCodec> = Arc::new(JpegLosslessCodec::new());

        registry.register(TransferSyntax::ImplicitVrLittleEndian, Arc::clone(&native));
        registry.register(TransferSyntax::ExplicitVrLittleEndian, native);
        registry.register(TransferSyntax::JpegBaseline, Arc::new(JpegBaselineCodec::new()));
        registry.register(TransferSyntax::JpegLossless, Arc::clone(&lossless));
        registry.register(TransferSyntax::JpegLosslessSv1, lossless);
        registry.register(TransferSyntax::RleLossless, Arc::new(RleLosslessCodec));
        registry
    }

    /// Register a codec; a later registration for the same syntax replaces the earlier one.
    pub fn register(&mut self, syntax: TransferSyntax, codec: Arc<dyn PixelCodec>) {
        if let Some(previous) = self.codecs.insert(syntax, Arc::clone(&codec)) {
            log::debug!(
                "Replaced codec {} with {} for {}",
                previous.info().name,
                codec.info().name,
                syntax
            );
        }
    }

    /// Look up the codec for a transfer syntax.
    pub fn resolve(&self, syntax: TransferSyntax) -> Result<Arc<dyn PixelCodec>> {
        self.codecs
            .get(&syntax)
            .cloned()
            .ok_or_else(|| {
                TranscodeError::NoCodecForSyntax(format!("{} ({})", syntax.name(), syntax.uid()))
            })
    }

    /// Transfer syntaxes with a registered codec, in declaration order.
    pub fn supported(&self) -> Vec<TransferSyntax> {
        TransferSyntax::ALL
            .iter()
            .copied()
            .filter(|ts| self.codecs.contains_key(ts))
            .collect()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.supported()
                    .into_iter()
                    .filter_map(|ts| self.codecs.get(&ts).map(|c| (ts, c.info().name))),
            )
            .finish()
    }
}

/// Codec for native little-endian pixel data.
#[derive(Debug, Clone, Copy, Default)]
pub struct UncompressedCodec;

impl PixelCodec for UncompressedCodec {
    fn decode(&self, data: &PixelData, description: &PixelDescription) -> Result<RasterBuffer> {
        let bytes = match data {
            PixelData::Native(bytes) => bytes,
            PixelData::Encapsulated(_) => {
                return Err(TranscodeError::CorruptPixelData(
                    "native transfer syntax with encapsulated pixel data".into(),
                ))
            }
        };

        let count = description.samples_per_frame();
        let expected = count * description.bytes_per_sample();
        // a single trailing pad byte is allowed
        if bytes.len() != expected && bytes.len() != expected + 1 {
            return Err(TranscodeError::CorruptPixelData(format!(
                "native pixel data has {} bytes, expected {}",
                bytes.len(),
                expected
            )));
        }

        let samples = if description.bits_allocated > 8 {
            let mut samples = vec![0u16; count];
            LittleEndian::read_u16_into(&bytes[..expected], &mut samples);
            samples
        } else {
            bytes[..expected].iter().map(|&b| u16::from(b)).collect()
        };

        Ok(description.raster(samples, description.native_layout()))
    }

    fn encode(
        &self,
        raster: &RasterBuffer,
        description: &PixelDescription,
        _params: &CodecParameters,
    ) -> Result<PixelData> {
        raster.validate()?;
        let arranged = raster.to_layout(description.native_layout());

        let bytes = if raster.bits_allocated > 8 {
            let mut bytes = vec![0u8; arranged.samples.len() * 2];
            LittleEndian::write_u16_into(&arranged.samples, &mut bytes);
            bytes
        } else {
            arranged.samples.iter().map(|&s| s as u8).collect()
        };

        Ok(PixelData::Native(bytes))
    }

    fn info(&self) -> CodecInfo {
        CodecInfo {
            name: "Uncompressed",
            mode: CompressionSupport::LosslessOnly,
            supports_quality: false,
        }
    }

    fn capabilities(&self) -> CodecCapabilities {
        CodecCapabilities {
            max_bits_per_sample: 16,
            supports_signed: true,
            supports_color: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::{gradient, image_dataset, native_bytes};

    fn description(rows: u16, columns: u16, bits: u16, spp: u16) -> PixelDescription {
        let dataset = image_dataset(rows, columns, bits, spp, Vec::new());
        PixelDescription::from_dataset(&dataset).unwrap()
    }

    #[test]
    fn test_default_registry() {
        let registry = CodecRegistry::with_defaults();
        assert_eq!(
            registry.supported(),
            vec![
                TransferSyntax::ImplicitVrLittleEndian,
                TransferSyntax::ExplicitVrLittleEndian,
                TransferSyntax::JpegBaseline,
                TransferSyntax::JpegLossless,
                TransferSyntax::JpegLosslessSv1,
                TransferSyntax::RleLossless,
            ]
        );
        assert_eq!(
            registry.resolve(TransferSyntax::JpegBaseline).unwrap().info().name,
            "JPEG Baseline"
        );
    }

    #[test]
    fn test_unregistered_syntax() {
        let registry = CodecRegistry::with_defaults();
        let err = registry.resolve(TransferSyntax::Jpeg2000).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NoCodecForSyntax);
    }

    #[test]
    fn test_last_registration_wins() {
        let mut registry = CodecRegistry::new();
        registry.register(TransferSyntax::JpegLosslessSv1, Arc::new(JpegLosslessCodec::new()));
        registry.register(TransferSyntax::JpegLosslessSv1, Arc::new(UncompressedCodec));
        assert_eq!(
            registry.resolve(TransferSyntax::JpegLosslessSv1).unwrap().info().name,
            "Uncompressed"
        );
    }

    #[test]
    fn test_uncompressed_round_trip_16bit_planar() {
        let mut desc = description(3, 5, 16, 3);
        desc.planar_configuration = 1;
        let samples = gradient(5, 3, 16, 3);
        let raster = RasterBuffer::new(5, 3, 16, 3, samples);

        let codec = UncompressedCodec;
        let encoded = codec
            .encode(&raster, &desc, &CodecParameters::lossless())
            .unwrap();
        let decoded = codec.decode(&encoded, &desc).unwrap();
        assert_eq!(decoded.layout, crate::SampleLayout::Planar);
        assert_eq!(decoded.to_layout(crate::SampleLayout::Interleaved).samples, raster.samples);
    }

    #[test]
    fn test_uncompressed_length_checks() {
        let desc = description(2, 3, 8, 1);
        let codec = UncompressedCodec;

        let padded = PixelData::Native(native_bytes(&[1, 2, 3, 4, 5, 6, 0], 8));
        assert_eq!(
            codec.decode(&padded, &desc).unwrap().samples,
            vec![1, 2, 3, 4, 5, 6]
        );

        let short = PixelData::Native(vec![0; 5]);
        assert_eq!(
            codec.decode(&short, &desc).unwrap_err().kind(),
            ErrorKind::CorruptPixelData
        );
        let long = PixelData::Native(vec![0; 8]);
        assert_eq!(
            codec.decode(&long, &desc).unwrap_err().kind(),
            ErrorKind::CorruptPixelData
        );
    }

    #[test]
    fn test_parameter_checks() {
        let codec = UncompressedCodec;
        assert!(codec.check_parameters(&CodecParameters::lossless()).is_ok());
        assert_eq!(
            codec
                .check_parameters(&CodecParameters::lossy(50).unwrap())
                .unwrap_err()
                .kind(),
            ErrorKind::IncompatibleParameters
        );
        assert_eq!(
            codec
                .check_parameters(&CodecParameters::new(true, Some(10)).unwrap())
                .unwrap_err()
                .kind(),
            ErrorKind::IncompatibleParameters
        );
    }
}
