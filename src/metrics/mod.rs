//! Fidelity metrics comparing a source raster with its re-decoded encoding.
//!
//! - **PSNR** (Peak Signal-to-Noise Ratio): reported for lossy targets
//! - **Mean absolute error**: average per-sample deviation
//!
//! # Example
//!
//! ```rust,ignore
//! use medimg_transcode::metrics::calculate_psnr;
//!
//! let psnr_result = calculate_psnr(&original, &decoded)?;
//! println!("PSNR: {:.2} dB", psnr_result.psnr_db);
//! ```

mod psnr;

pub use psnr::{calculate_psnr, PsnrResult};

use crate::error::{Result, TranscodeError};
use crate::RasterBuffer;

/// Validate that two rasters can be compared.
pub(crate) fn validate_rasters(original: &RasterBuffer, decoded: &RasterBuffer) -> Result<()> {
    if original.width != decoded.width || original.height != decoded.height {
        return Err(TranscodeError::CorruptPixelData(format!(
            "Image dimensions mismatch: {}x{} vs {}x{}",
            original.width, original.height, decoded.width, decoded.height
        )));
    }

    if original.bits_allocated != decoded.bits_allocated {
        return Err(TranscodeError::CorruptPixelData(format!(
            "Bits allocated mismatch: {} vs {}",
            original.bits_allocated, decoded.bits_allocated
        )));
    }

    if original.samples_per_pixel != decoded.samples_per_pixel {
        return Err(TranscodeError::CorruptPixelData(format!(
            "Samples per pixel mismatch: {} vs {}",
            original.samples_per_pixel, decoded.samples_per_pixel
        )));
    }

    if original.samples.len() != decoded.samples.len() {
        return Err(TranscodeError::CorruptPixelData(format!(
            "Sample count mismatch: {} vs {}",
            original.samples.len(),
            decoded.samples.len()
        )));
    }

    Ok(())
}

/// Get the maximum possible sample value for a given bit depth.
pub(crate) fn max_pixel_value(bits: u16) -> f64 {
    ((1u64 << bits) - 1) as f64
}

/// Sample values as f64 in interleaved order.
pub(crate) fn extract_samples(raster: &RasterBuffer) -> Vec<f64> {
    raster
        .interleaved_samples()
        .iter()
        .map(|&s| f64::from(s))
        .collect()
}

/// Mean absolute per-sample difference between two rasters.
pub fn mean_absolute_error(original: &RasterBuffer, decoded: &RasterBuffer) -> Result<f64> {
    validate_rasters(original, decoded)?;
    let a = extract_samples(original);
    let b = extract_samples(decoded);
    if a.is_empty() {
        return Ok(0.0);
    }
    let sum: f64 = a.iter().zip(&b).map(|(x, y)| (x - y).abs()).sum();
    Ok(sum / a.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SampleLayout;

    fn create_test_raster(width: u32, height: u32, bits: u16, value: u16) -> RasterBuffer {
        RasterBuffer::new(
            width,
            height,
            bits,
            1,
            vec![value; width as usize * height as usize],
        )
    }

    #[test]
    fn test_validate_rasters_matching() {
        let a = create_test_raster(64, 64, 8, 128);
        let b = create_test_raster(64, 64, 8, 100);
        assert!(validate_rasters(&a, &b).is_ok());
    }

    #[test]
    fn test_validate_rasters_dimension_mismatch() {
        let a = create_test_raster(64, 64, 8, 128);
        let b = create_test_raster(32, 32, 8, 128);
        assert!(validate_rasters(&a, &b).is_err());
    }

    #[test]
    fn test_max_pixel_value() {
        assert_eq!(max_pixel_value(8), 255.0);
        assert_eq!(max_pixel_value(12), 4095.0);
        assert_eq!(max_pixel_value(16), 65535.0);
    }

    #[test]
    fn test_mean_absolute_error_ignores_layout() {
        let interleaved = RasterBuffer::new(2, 1, 8, 3, vec![10, 20, 30, 40, 50, 60]);
        let planar = interleaved.to_layout(SampleLayout::Planar);
        assert_eq!(mean_absolute_error(&interleaved, &planar).unwrap(), 0.0);

        let shifted = RasterBuffer::new(2, 1, 8, 3, vec![12, 18, 30, 40, 50, 66]);
        let mae = mean_absolute_error(&interleaved, &shifted).unwrap();
        assert!((mae - 10.0 / 6.0).abs() < 1e-9);
    }
}
