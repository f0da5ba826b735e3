//! Transfer syntax identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Transfer syntax UIDs for DICOM.
pub mod uids {
    /// Implicit VR Little Endian (uncompressed)
    pub const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
    /// Explicit VR Little Endian (uncompressed)
    pub const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
    /// JPEG Baseline (Process 1)
    pub const JPEG_BASELINE: &str = "1.2.840.10008.1.2.4.50";
    /// JPEG Extended (Process 2 & 4)
    pub const JPEG_EXTENDED: &str = "1.2.840.10008.1.2.4.51";
    /// JPEG Lossless, Non-Hierarchical (Process 14)
    pub const JPEG_LOSSLESS: &str = "1.2.840.10008.1.2.4.57";
    /// JPEG Lossless, First-Order Prediction (Process 14, Selection Value 1)
    pub const JPEG_LOSSLESS_SV1: &str = "1.2.840.10008.1.2.4.70";
    /// JPEG-LS Lossless
    pub const JPEG_LS_LOSSLESS: &str = "1.2.840.10008.1.2.4.80";
    /// JPEG-LS Near-Lossless
    pub const JPEG_LS_NEAR_LOSSLESS: &str = "1.2.840.10008.1.2.4.81";
    /// JPEG 2000 Lossless
    pub const JPEG_2000_LOSSLESS: &str = "1.2.840.10008.1.2.4.90";
    /// JPEG 2000
    pub const JPEG_2000: &str = "1.2.840.10008.1.2.4.91";
    /// RLE Lossless
    pub const RLE_LOSSLESS: &str = "1.2.840.10008.1.2.5";
}

/// A recognized transfer syntax.
///
/// Recognition only means the container can be parsed; whether pixel data
/// can be decoded or encoded depends on the codec registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransferSyntax {
    /// Implicit VR Little Endian
    ImplicitVrLittleEndian,
    /// Explicit VR Little Endian
    ExplicitVrLittleEndian,
    /// JPEG Baseline (Process 1), lossy 8-bit
    JpegBaseline,
    /// JPEG Extended (Process 2 & 4)
    JpegExtended,
    /// JPEG Lossless (Process 14), any predictor
    JpegLossless,
    /// JPEG Lossless (Process 14, Selection Value 1)
    JpegLosslessSv1,
    /// JPEG-LS Lossless
    JpegLsLossless,
    /// JPEG-LS Near-Lossless
    JpegLsNearLossless,
    /// JPEG 2000 Lossless
    Jpeg2000Lossless,
    /// JPEG 2000
    Jpeg2000,
    /// RLE Lossless
    RleLossless,
}

impl TransferSyntax {
    /// Every recognized transfer syntax.
    pub const ALL: [TransferSyntax; 11] = [
        TransferSyntax::ImplicitVrLittleEndian,
        TransferSyntax::ExplicitVrLittleEndian,
        TransferSyntax::JpegBaseline,
        TransferSyntax::JpegExtended,
        TransferSyntax::JpegLossless,
        TransferSyntax::JpegLosslessSv1,
        TransferSyntax::JpegLsLossless,
        TransferSyntax::JpegLsNearLossless,
        TransferSyntax::Jpeg2000Lossless,
        TransferSyntax::Jpeg2000,
        TransferSyntax::RleLossless,
    ];

    /// Look up a transfer syntax by UID.
    ///
    /// Trailing NUL and space padding, as found in UI values, is ignored.
    pub fn from_uid(uid: &str) -> Option<Self> {
        let uid = uid.trim_end_matches(['\0', ' ']).trim();
        Self::ALL.into_iter().find(|ts| ts.uid() == uid)
    }

    /// The UID of this transfer syntax.
    pub fn uid(&self) -> &'static str {
        match self {
            Self::ImplicitVrLittleEndian => uids::IMPLICIT_VR_LITTLE_ENDIAN,
            Self::ExplicitVrLittleEndian => uids::EXPLICIT_VR_LITTLE_ENDIAN,
            Self::JpegBaseline => uids::JPEG_BASELINE,
            Self::JpegExtended => uids::JPEG_EXTENDED,
            Self::JpegLossless => uids::JPEG_LOSSLESS,
            Self::JpegLosslessSv1 => uids::JPEG_LOSSLESS_SV1,
            Self::JpegLsLossless => uids::JPEG_LS_LOSSLESS,
            Self::JpegLsNearLossless => uids::JPEG_LS_NEAR_LOSSLESS,
            Self::Jpeg2000Lossless => uids::JPEG_2000_LOSSLESS,
            Self::Jpeg2000 => uids::JPEG_2000,
            Self::RleLossless => uids::RLE_LOSSLESS,
        }
    }

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ImplicitVrLittleEndian => "Implicit VR Little Endian",
            Self::ExplicitVrLittleEndian => "Explicit VR Little Endian",
            Self::JpegBaseline => "JPEG Baseline (Process 1)",
            Self::JpegExtended => "JPEG Extended (Process 2 & 4)",
            Self::JpegLossless => "JPEG Lossless (Process 14)",
            Self::JpegLosslessSv1 => "JPEG Lossless SV1",
            Self::JpegLsLossless => "JPEG-LS Lossless",
            Self::JpegLsNearLossless => "JPEG-LS Near-Lossless",
            Self::Jpeg2000Lossless => "JPEG 2000 Lossless",
            Self::Jpeg2000 => "JPEG 2000",
            Self::RleLossless => "RLE Lossless",
        }
    }

    /// Short name accepted on the command line and in configuration files.
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::ImplicitVrLittleEndian => "implicit-le",
            Self::ExplicitVrLittleEndian => "explicit-le",
            Self::JpegBaseline => "jpeg-baseline",
            Self::JpegExtended => "jpeg-extended",
            Self::JpegLossless => "jpeg-lossless",
            Self::JpegLosslessSv1 => "jpeg-lossless-sv1",
            Self::JpegLsLossless => "jpeg-ls-lossless",
            Self::JpegLsNearLossless => "jpeg-ls-near-lossless",
            Self::Jpeg2000Lossless => "jpeg2000-lossless",
            Self::Jpeg2000 => "jpeg2000",
            Self::RleLossless => "rle",
        }
    }

    /// Whether the dataset is encoded with explicit value representations.
    pub fn is_explicit_vr(&self) -> bool {
        !matches!(self, Self::ImplicitVrLittleEndian)
    }

    /// Whether pixel data is stored as encapsulated fragments.
    pub fn is_encapsulated(&self) -> bool {
        !matches!(
            self,
            Self::ImplicitVrLittleEndian | Self::ExplicitVrLittleEndian
        )
    }

    /// Whether the syntax may discard information.
    pub fn is_lossy(&self) -> bool {
        matches!(
            self,
            Self::JpegBaseline | Self::JpegExtended | Self::JpegLsNearLossless | Self::Jpeg2000
        )
    }
}

impl fmt::Display for TransferSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.uid())
    }
}

impl FromStr for TransferSyntax {
    type Err = String;

    /// Accepts either a UID or a short name such as `jpeg-baseline`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::from_uid(s)
            .or_else(|| {
                Self::ALL
                    .into_iter()
                    .find(|ts| ts.short_name().eq_ignore_ascii_case(s))
            })
            .ok_or_else(|| format!("unknown transfer syntax '{}'", s))
    }
}

impl Serialize for TransferSyntax {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.short_name())
    }
}

impl<'de> Deserialize<'de> for TransferSyntax {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_uid_ignores_padding() {
        assert_eq!(
            TransferSyntax::from_uid("1.2.840.10008.1.2.4.50\0"),
            Some(TransferSyntax::JpegBaseline)
        );
        assert_eq!(
            TransferSyntax::from_uid("1.2.840.10008.1.2 "),
            Some(TransferSyntax::ImplicitVrLittleEndian)
        );
        assert_eq!(TransferSyntax::from_uid("1.2.840.10008.1.2.2"), None);
    }

    #[test]
    fn test_parse_short_name_and_uid() {
        assert_eq!(
            "rle".parse::<TransferSyntax>().unwrap(),
            TransferSyntax::RleLossless
        );
        assert_eq!(
            "JPEG-Baseline".parse::<TransferSyntax>().unwrap(),
            TransferSyntax::JpegBaseline
        );
        assert_eq!(
            "1.2.840.10008.1.2.4.70".parse::<TransferSyntax>().unwrap(),
            TransferSyntax::JpegLosslessSv1
        );
        assert!("jpeg-xl".parse::<TransferSyntax>().is_err());
    }

    #[test]
    fn test_encoding_properties() {
        assert!(!TransferSyntax::ImplicitVrLittleEndian.is_explicit_vr());
        assert!(TransferSyntax::RleLossless.is_explicit_vr());
        assert!(!TransferSyntax::ExplicitVrLittleEndian.is_encapsulated());
        assert!(TransferSyntax::JpegLosslessSv1.is_encapsulated());
        assert!(TransferSyntax::JpegBaseline.is_lossy());
        assert!(!TransferSyntax::RleLossless.is_lossy());
    }
}
