//! PSNR (Peak Signal-to-Noise Ratio) calculation.
//!
//! PSNR is a common metric for measuring the quality of lossy compression.
//! Higher values indicate better quality (less distortion).
//!
//! - Lossless compression: PSNR = infinity (MSE = 0)
//! - High quality: PSNR > 40 dB
//! - Good quality: PSNR 30-40 dB
//! - Acceptable: PSNR 20-30 dB

use serde::Serialize;

use crate::error::Result;
use crate::RasterBuffer;

use super::{extract_samples, max_pixel_value, validate_rasters};

/// Result of PSNR calculation.
#[derive(Debug, Clone, Serialize)]
pub struct PsnrResult {
    /// PSNR value in decibels (higher = better quality).
    /// f64::INFINITY for identical rasters.
    pub psnr_db: f64,

    /// Mean Squared Error between images.
    /// 0.0 indicates identical images.
    pub mse: f64,

    /// Maximum possible sample value (based on bits stored).
    pub max_value: f64,

    /// Per-component PSNR for multi-channel images (e.g., RGB).
    /// None for single-channel (grayscale) images.
    pub per_component: Option<Vec<f64>>,
}

impl PsnrResult {
    /// Check if the images are identical (lossless).
    pub fn is_lossless(&self) -> bool {
        self.mse == 0.0
    }

    /// Get a quality rating based on PSNR value.
    pub fn quality_rating(&self) -> &'static str {
        if self.psnr_db.is_infinite() {
            "Lossless (identical)"
        } else if self.psnr_db > 50.0 {
            "Excellent"
        } else if self.psnr_db > 40.0 {
            "Very Good"
        } else if self.psnr_db > 30.0 {
            "Good"
        } else if self.psnr_db > 20.0 {
            "Fair"
        } else {
            "Poor"
        }
    }
}

impl std::fmt::Display for PsnrResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.psnr_db.is_infinite() {
            write!(f, "PSNR: Infinity (lossless)")
        } else {
            write!(f, "PSNR: {:.2} dB ({})", self.psnr_db, self.quality_rating())
        }
    }
}

/// Calculate PSNR between a source raster and the decoded result of its encoding.
///
/// # Errors
///
/// Returns `CorruptPixelData` if the rasters differ in geometry or sample format.
pub fn calculate_psnr(original: &RasterBuffer, decoded: &RasterBuffer) -> Result<PsnrResult> {
    validate_rasters(original, decoded)?;

    let max_value = max_pixel_value(original.bits_stored);
    let original_pixels = extract_samples(original);
    let compressed_pixels = extract_samples(decoded);

    // Calculate per-component PSNR for multi-sample rasters
    let per_component = if original.samples_per_pixel > 1 {
        let samples = original.samples_per_pixel as usize;
        let mut component_psnrs = Vec::with_capacity(samples);

        for c in 0..samples {
            let mse = calculate_component_mse(&original_pixels, &compressed_pixels, samples, c);
            let psnr = if mse == 0.0 {
                f64::INFINITY
            } else {
                10.0 * (max_value * max_value / mse).log10()
            };
            component_psnrs.push(psnr);
        }

        Some(component_psnrs)
    } else {
        None
    };

    // Calculate overall MSE
    let mse = calculate_mse(&original_pixels, &compressed_pixels);

    // Calculate PSNR
    let psnr_db = if mse == 0.0 {
        f64::INFINITY
    } else {
        10.0 * (max_value * max_value / mse).log10()
    };

    Ok(PsnrResult {
        psnr_db,
        mse,
        max_value,
        per_component,
    })
}

/// Calculate Mean Squared Error between two pixel arrays.
fn calculate_mse(original: &[f64], compressed: &[f64]) -> f64 {
    if original.is_empty() {
        return 0.0;
    }

    let sum: f64 = original
        .iter()
        .zip(compressed.iter())
        .map(|(o, c)| {
            let diff = o - c;
            diff * diff
        })
        .sum();

    sum / original.len() as f64
}

/// Calculate MSE for a specific component in multi-channel images.
fn calculate_component_mse(
    original: &[f64],
    compressed: &[f64],
    num_components: usize,
    component: usize,
) -> f64 {
    let pixels_per_component = original.len() / num_components;
    if pixels_per_component == 0 {
        return 0.0;
    }

    let sum: f64 = (0..pixels_per_component)
        .map(|i| {
            let idx = i * num_components + component;
            let diff = original[idx] - compressed[idx];
            diff * diff
        })
        .sum();

    sum / pixels_per_component as f64
}
