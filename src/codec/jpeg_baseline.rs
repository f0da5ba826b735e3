//! JPEG Baseline (Process 1) codec.
//!
//! Lossy 8-bit compression for grayscale and RGB images, backed by the
//! `image` crate's JPEG encoder and decoder.

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat};

use crate::config::{CodecParameters, DEFAULT_QUALITY};
use crate::dicom::{EncapsulatedPixelData, PixelDescription};
use crate::error::{Result, TranscodeError};
use crate::{RasterBuffer, SampleLayout};

use super::traits::{CodecCapabilities, CodecInfo, CompressionSupport, PixelCodec, PixelData};

/// JPEG Baseline codec.
#[derive(Debug, Clone, Copy)]
pub struct JpegBaselineCodec {
    /// Quality used when the parameters carry none.
    pub default_quality: u8,
}

impl JpegBaselineCodec {
    /// Create a codec using quality 50 by default.
    pub fn new() -> Self {
        Self {
            default_quality: DEFAULT_QUALITY,
        }
    }

    fn color_type(samples_per_pixel: u16) -> Result<ExtendedColorType> {
        match samples_per_pixel {
            1 => Ok(ExtendedColorType::L8),
            3 => Ok(ExtendedColorType::Rgb8),
            n => Err(TranscodeError::UnsupportedPixelFormat(format!(
                "JPEG Baseline cannot encode {} samples per pixel",
                n
            ))),
        }
    }
}

impl Default for JpegBaselineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl PixelCodec for JpegBaselineCodec {
    fn decode(&self, data: &PixelData, description: &PixelDescription) -> Result<RasterBuffer> {
        if description.bits_allocated != 8 {
            return Err(TranscodeError::UnsupportedPixelFormat(format!(
                "JPEG Baseline pixel data with BitsAllocated {}",
                description.bits_allocated
            )));
        }

        let frame = data.frame("JPEG Baseline")?;
        let image = image::load_from_memory_with_format(&frame, ImageFormat::Jpeg)
            .map_err(|e| TranscodeError::CorruptPixelData(format!("JPEG decode failed: {}", e)))?;

        if image.width() != description.columns || image.height() != description.rows {
            return Err(TranscodeError::CorruptPixelData(format!(
                "JPEG frame is {}x{}, dataset declares {}x{}",
                image.width(),
                image.height(),
                description.columns,
                description.rows
            )));
        }

        let bytes = match description.samples_per_pixel {
            1 => image.into_luma8().into_raw(),
            3 => image.into_rgb8().into_raw(),
            n => {
                return Err(TranscodeError::UnsupportedPixelFormat(format!(
                    "JPEG Baseline with {} samples per pixel",
                    n
                )))
            }
        };

        let samples = bytes.into_iter().map(u16::from).collect();
        Ok(description.raster(samples, SampleLayout::Interleaved))
    }

    fn encode(
        &self,
        raster: &RasterBuffer,
        _description: &PixelDescription,
        params: &CodecParameters,
    ) -> Result<PixelData> {
        raster.validate()?;
        if !self.can_encode(raster) {
            return Err(TranscodeError::UnsupportedPixelFormat(format!(
                "JPEG Baseline requires unsigned 8-bit samples, got {}-bit{}",
                raster.bits_allocated,
                if raster.signed { " signed" } else { "" }
            )));
        }
        let color_type = Self::color_type(raster.samples_per_pixel)?;

        // the encoder's lowest setting is 1
        let quality = params.quality().unwrap_or(self.default_quality).clamp(1, 100);
        let bytes: Vec<u8> = raster
            .interleaved_samples()
            .iter()
            .map(|&s| s.min(255) as u8)
            .collect();

        let mut codestream = Vec::new();
        JpegEncoder::new_with_quality(&mut codestream, quality)
            .encode(&bytes, raster.width, raster.height, color_type)
            .map_err(|e| {
                TranscodeError::UnsupportedPixelFormat(format!("JPEG encode failed: {}", e))
            })?;

        log::debug!(
            "JPEG Baseline encoded {}x{} image to {} bytes (ratio: {:.2}:1, quality={})",
            raster.width,
            raster.height,
            codestream.len(),
            bytes.len() as f64 / codestream.len().max(1) as f64,
            quality
        );

        Ok(PixelData::Encapsulated(EncapsulatedPixelData::single(
            codestream,
        )))
    }

    fn info(&self) -> CodecInfo {
        CodecInfo {
            name: "JPEG Baseline",
            mode: CompressionSupport::LossyOnly,
            supports_quality: true,
        }
    }

    fn capabilities(&self) -> CodecCapabilities {
        CodecCapabilities {
            max_bits_per_sample: 8,
            supports_signed: false,
            supports_color: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::metrics::mean_absolute_error;
    use crate::test_support::{gradient, image_dataset};

    fn description(rows: u16, columns: u16, spp: u16) -> PixelDescription {
        PixelDescription::from_dataset(&image_dataset(rows, columns, 8, spp, Vec::new())).unwrap()
    }

    fn round_trip(raster: &RasterBuffer, desc: &PixelDescription, quality: i64) -> RasterBuffer {
        let codec = JpegBaselineCodec::new();
        let params = CodecParameters::lossy(quality).unwrap();
        let encoded = codec.encode(raster, desc, &params).unwrap();
        codec.decode(&encoded, desc).unwrap()
    }

    #[test]
    fn test_grayscale_round_trip_keeps_geometry() {
        let desc = description(16, 24, 1);
        let raster = RasterBuffer::new(24, 16, 8, 1, gradient(24, 16, 8, 1));
        let decoded = round_trip(&raster, &desc, 90);

        assert!(decoded.same_geometry(&raster));
        assert!((decoded.mean() - raster.mean()).abs() < 3.0);
    }

    #[test]
    fn test_rgb_round_trip() {
        let desc = description(8, 8, 3);
        let raster = RasterBuffer::new(8, 8, 8, 3, gradient(8, 8, 8, 3));
        let decoded = round_trip(&raster, &desc, 95);

        assert_eq!(decoded.samples.len(), raster.samples.len());
        assert!(mean_absolute_error(&raster, &decoded).unwrap() < 8.0);
    }

    #[test]
    fn test_error_does_not_grow_with_quality() {
        let desc = description(32, 32, 1);
        let raster = RasterBuffer::new(32, 32, 8, 1, gradient(32, 32, 8, 1));

        let errors: Vec<f64> = [10, 40, 70, 95]
            .iter()
            .map(|&q| mean_absolute_error(&raster, &round_trip(&raster, &desc, q)).unwrap())
            .collect();
        for pair in errors.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-9, "errors: {:?}", errors);
        }
    }

    #[test]
    fn test_quality_zero_is_accepted() {
        let desc = description(8, 8, 1);
        let raster = RasterBuffer::new(8, 8, 8, 1, gradient(8, 8, 8, 1));
        let decoded = round_trip(&raster, &desc, 0);
        assert!(decoded.same_geometry(&raster));
    }

    #[test]
    fn test_rejects_16bit_and_lossless() {
        let codec = JpegBaselineCodec::new();
        let desc = description(4, 4, 1);
        let raster = RasterBuffer::new(4, 4, 16, 1, vec![0; 16]);
        let err = codec
            .encode(&raster, &desc, &CodecParameters::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedPixelFormat);

        let err = codec
            .check_parameters(&CodecParameters::lossless())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompatibleParameters);
    }

    #[test]
    fn test_garbage_fragment_is_corrupt() {
        let codec = JpegBaselineCodec::new();
        let desc = description(4, 4, 1);
        let data = PixelData::Encapsulated(EncapsulatedPixelData::single(vec![0xFF, 0xD8, 1, 2]));
        assert_eq!(
            codec.decode(&data, &desc).unwrap_err().kind(),
            ErrorKind::CorruptPixelData
        );
    }
}
