//! Configuration types for conversion targets and codec settings.

mod transfer_syntax;

pub use transfer_syntax::{uids, TransferSyntax};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TranscodeError};

/// Quality used by lossy codecs when none is supplied.
pub const DEFAULT_QUALITY: u8 = 50;

/// Codec parameters for the encode step.
///
/// `quality` is `None` when not applicable. Constructors guarantee that a
/// present quality lies within 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CodecParameters {
    lossless: bool,
    quality: Option<u8>,
}

impl CodecParameters {
    /// Parameters for lossless encoding.
    pub fn lossless() -> Self {
        Self {
            lossless: true,
            quality: None,
        }
    }

    /// Parameters for lossy encoding at the given quality.
    pub fn lossy(quality: i64) -> Result<Self> {
        Ok(Self {
            lossless: false,
            quality: Some(Self::check_quality(quality)?),
        })
    }

    /// Build parameters from raw settings, validating the quality range.
    ///
    /// The combination `lossless = true` with a quality is accepted here and
    /// rejected later by the target codec.
    pub fn new(lossless: bool, quality: Option<i64>) -> Result<Self> {
        let quality = quality.map(Self::check_quality).transpose()?;
        Ok(Self { lossless, quality })
    }

    /// Parse a textual quality value (as given on the command line).
    pub fn parse_quality(text: &str) -> Result<u8> {
        let value = text.trim().parse::<i64>().map_err(|_| {
            TranscodeError::InvalidParameter(format!("quality '{}' is not a number", text))
        })?;
        Self::check_quality(value)
    }

    fn check_quality(quality: i64) -> Result<u8> {
        if (0..=100).contains(&quality) {
            Ok(quality as u8)
        } else {
            Err(TranscodeError::InvalidParameter(format!(
                "quality {} is outside 0-100",
                quality
            )))
        }
    }

    /// Whether lossless encoding was requested.
    pub fn is_lossless(&self) -> bool {
        self.lossless
    }

    /// Requested quality, if applicable.
    pub fn quality(&self) -> Option<u8> {
        self.quality
    }
}

impl Default for CodecParameters {
    fn default() -> Self {
        Self {
            lossless: false,
            quality: Some(DEFAULT_QUALITY),
        }
    }
}

/// How the writer places the output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Write a temporary file next to the destination and rename it on success.
    #[default]
    Atomic,
    /// Create or truncate the destination and write into it directly.
    Direct,
}

/// Quality as it appears in a configuration file: a number or a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QualitySetting {
    /// Numeric quality.
    Number(i64),
    /// Textual quality, parsed on use.
    Text(String),
}

impl QualitySetting {
    fn resolve(&self) -> Result<i64> {
        match self {
            QualitySetting::Number(n) => Ok(*n),
            QualitySetting::Text(s) => CodecParameters::parse_quality(s).map(i64::from),
        }
    }
}

/// Configuration for a conversion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Transfer syntax to convert to.
    pub target_syntax: TransferSyntax,
    /// Request lossless encoding.
    pub lossless: bool,
    /// Lossy quality (0-100); absent means the default for lossy targets.
    pub quality: Option<QualitySetting>,
    /// Output placement strategy.
    pub write_mode: WriteMode,
    /// Decode the encoded pixel data again and compare against the source raster.
    pub verify: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            target_syntax: TransferSyntax::JpegBaseline,
            lossless: false,
            quality: None,
            write_mode: WriteMode::Atomic,
            verify: false,
        }
    }
}

impl ConversionConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            TranscodeError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Lossless configuration for the given target.
    pub fn lossless(target_syntax: TransferSyntax) -> Self {
        Self {
            target_syntax,
            lossless: true,
            quality: None,
            ..Default::default()
        }
    }

    /// Lossy configuration for the given target and quality.
    pub fn lossy(target_syntax: TransferSyntax, quality: i64) -> Self {
        Self {
            target_syntax,
            lossless: false,
            quality: Some(QualitySetting::Number(quality)),
            ..Default::default()
        }
    }

    /// Validated codec parameters.
    ///
    /// A lossy request without an explicit quality gets [`DEFAULT_QUALITY`].
    pub fn codec_parameters(&self) -> Result<CodecParameters> {
        let quality = self.quality.as_ref().map(QualitySetting::resolve).transpose()?;
        let quality = match quality {
            None if !self.lossless => Some(i64::from(DEFAULT_QUALITY)),
            q => q,
        };
        CodecParameters::new(self.lossless, quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_quality_range_is_enforced() {
        assert!(CodecParameters::lossy(0).is_ok());
        assert!(CodecParameters::lossy(100).is_ok());
        assert_eq!(
            CodecParameters::lossy(-1).unwrap_err().kind(),
            ErrorKind::InvalidParameter
        );
        assert_eq!(
            CodecParameters::lossy(101).unwrap_err().kind(),
            ErrorKind::InvalidParameter
        );
    }

    #[test]
    fn test_non_numeric_quality_is_rejected() {
        let err = CodecParameters::parse_quality("high").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        assert_eq!(CodecParameters::parse_quality(" 75 ").unwrap(), 75);
    }

    #[test]
    fn test_default_matches_baseline_script() {
        let config = ConversionConfig::default();
        assert_eq!(config.target_syntax, TransferSyntax::JpegBaseline);
        let params = config.codec_parameters().unwrap();
        assert!(!params.is_lossless());
        assert_eq!(params.quality(), Some(50));
    }

    #[test]
    fn test_config_from_toml() {
        let config = ConversionConfig::from_toml_str(
            r#"
            target_syntax = "1.2.840.10008.1.2.5"
            lossless = true
            write_mode = "direct"
            "#,
        )
        .unwrap();
        assert_eq!(config.target_syntax, TransferSyntax::RleLossless);
        assert_eq!(config.write_mode, WriteMode::Direct);
        assert_eq!(
            config.codec_parameters().unwrap(),
            CodecParameters::lossless()
        );

        let config = ConversionConfig::from_toml_str("quality = \"abc\"").unwrap();
        assert_eq!(
            config.codec_parameters().unwrap_err().kind(),
            ErrorKind::InvalidParameter
        );
    }

    #[test]
    fn test_unknown_syntax_in_toml_is_config_error() {
        let err = ConversionConfig::from_toml_str("target_syntax = \"jpeg-xl\"").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
