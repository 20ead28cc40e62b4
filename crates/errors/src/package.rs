//! Package archive and metadata error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum PackageError {
    #[error("package corrupted: {message}")]
    Corrupted { message: String },

    #[error("package archive has no control segment")]
    MissingControl,

    #[error("package archive has no data segment")]
    MissingData,

    #[error("invalid checksum {checksum}: {message}")]
    InvalidChecksum { checksum: String, message: String },

    #[error("checksum mismatch for {package}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        package: String,
        expected: String,
        actual: String,
    },

    #[error("data hash mismatch: control declares {declared}, payload hashes to {actual}")]
    DataHashMismatch { declared: String, actual: String },

    #[error("invalid package metadata: {message}")]
    InvalidMetadata { message: String },
}

impl UserFacingError for PackageError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::ChecksumMismatch { .. } | Self::DataHashMismatch { .. } => {
                Some("The repository index and the package archive disagree; refresh the mirror.")
            }
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::Corrupted { .. } => "package.corrupted",
            Self::MissingControl => "package.missing_control",
            Self::MissingData => "package.missing_data",
            Self::InvalidChecksum { .. } => "package.invalid_checksum",
            Self::ChecksumMismatch { .. } => "package.checksum_mismatch",
            Self::DataHashMismatch { .. } => "package.datahash_mismatch",
            Self::InvalidMetadata { .. } => "package.invalid_metadata",
        };
        Some(code)
    }
}
