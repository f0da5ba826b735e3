//! Error types for the transfer syntax conversion library.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for the library.
pub type Result<T> = std::result::Result<T, TranscodeError>;

/// Main error type for transfer syntax conversion.
#[derive(Error, Debug)]
pub enum TranscodeError {
    /// Preamble, file meta group or dataset structure is missing or truncated.
    #[error("Malformed container: {0}")]
    MalformedContainer(String),

    /// The declared transfer syntax UID is not recognized at all.
    #[error("Unsupported transfer syntax: {0}")]
    UnsupportedSyntax(String),

    /// The transfer syntax is known but no codec is registered for it.
    #[error("No codec registered for transfer syntax {0}")]
    NoCodecForSyntax(String),

    /// Pixel data does not match its declared encoding or geometry.
    #[error("Corrupt pixel data: {0}")]
    CorruptPixelData(String),

    /// A codec parameter is out of range or not accepted by the codec.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The requested parameters contradict the target codec's mode.
    #[error("Incompatible parameters: {0}")]
    IncompatibleParameters(String),

    /// The image layout cannot be handled by the selected codec.
    #[error("Unsupported pixel format: {0}")]
    UnsupportedPixelFormat(String),

    /// Writing the output file failed.
    #[error("Failed to write {}: {source}", path.display())]
    WriteError {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// I/O error while reading input.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The conversion was cancelled before encoding.
    #[error("Conversion cancelled")]
    Cancelled,

    /// One or more files of a batch failed.
    #[error("{failed} of {total} conversions failed")]
    BatchFailed {
        /// Number of failed conversions.
        failed: usize,
        /// Number of attempted conversions.
        total: usize,
    },
}

/// Stable classification of a [`TranscodeError`], used for logging at the CLI boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`TranscodeError::MalformedContainer`].
    MalformedContainer,
    /// See [`TranscodeError::UnsupportedSyntax`].
    UnsupportedSyntax,
    /// See [`TranscodeError::NoCodecForSyntax`].
    NoCodecForSyntax,
    /// See [`TranscodeError::CorruptPixelData`].
    CorruptPixelData,
    /// See [`TranscodeError::InvalidParameter`].
    InvalidParameter,
    /// See [`TranscodeError::IncompatibleParameters`].
    IncompatibleParameters,
    /// See [`TranscodeError::UnsupportedPixelFormat`].
    UnsupportedPixelFormat,
    /// See [`TranscodeError::WriteError`].
    WriteError,
    /// See [`TranscodeError::Io`].
    Io,
    /// See [`TranscodeError::Config`].
    Config,
    /// See [`TranscodeError::Cancelled`].
    Cancelled,
    /// See [`TranscodeError::BatchFailed`].
    BatchFailed,
}

impl ErrorKind {
    /// Name of the error kind as used in log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedContainer => "MalformedContainer",
            Self::UnsupportedSyntax => "UnsupportedSyntax",
            Self::NoCodecForSyntax => "NoCodecForSyntax",
            Self::CorruptPixelData => "CorruptPixelData",
            Self::InvalidParameter => "InvalidParameter",
            Self::IncompatibleParameters => "IncompatibleParameters",
            Self::UnsupportedPixelFormat => "UnsupportedPixelFormat",
            Self::WriteError => "WriteError",
            Self::Io => "Io",
            Self::Config => "Config",
            Self::Cancelled => "Cancelled",
            Self::BatchFailed => "BatchFailed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TranscodeError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedContainer(_) => ErrorKind::MalformedContainer,
            Self::UnsupportedSyntax(_) => ErrorKind::UnsupportedSyntax,
            Self::NoCodecForSyntax(_) => ErrorKind::NoCodecForSyntax,
            Self::CorruptPixelData(_) => ErrorKind::CorruptPixelData,
            Self::InvalidParameter(_) => ErrorKind::InvalidParameter,
            Self::IncompatibleParameters(_) => ErrorKind::IncompatibleParameters,
            Self::UnsupportedPixelFormat(_) => ErrorKind::UnsupportedPixelFormat,
            Self::WriteError { .. } => ErrorKind::WriteError,
            Self::Io(_) => ErrorKind::Io,
            Self::Config(_) => ErrorKind::Config,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::BatchFailed { .. } => ErrorKind::BatchFailed,
        }
    }

    /// Build a [`TranscodeError::WriteError`] for the given destination.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteError {
            path: path.into(),
            source,
        }
    }
}

impl From<toml::de::Error> for TranscodeError {
    fn from(err: toml::de::Error) -> Self {
        TranscodeError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        let err = TranscodeError::NoCodecForSyntax("1.2.840.10008.1.2.4.90".into());
        assert_eq!(err.kind(), ErrorKind::NoCodecForSyntax);
        assert_eq!(err.kind().to_string(), "NoCodecForSyntax");

        let err = TranscodeError::write(
            "/tmp/out.dcm",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.kind(), ErrorKind::WriteError);
        assert!(err.to_string().contains("/tmp/out.dcm"));
    }

    #[test]
    fn test_toml_error_is_config() {
        let err: TranscodeError = toml::from_str::<toml::Value>("= broken")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
