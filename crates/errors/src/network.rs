//! Network-related error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum NetworkError {
    #[error("connection timeout to {url}")]
    Timeout { url: String },

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("HTTP error {status}: {message}")]
    HttpError { status: u16, message: String },

    #[error("server does not support range requests for {url}")]
    PartialContentNotSupported { url: String },

    #[error("failed to read {path}: {message}")]
    LocalReadFailed { path: String, message: String },

    #[error("SSL/TLS error: {0}")]
    TlsError(String),
}

impl UserFacingError for NetworkError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Timeout { .. } | Self::ConnectionRefused(_) => {
                Some("Check network connectivity or raise network.timeout in the config.")
            }
            Self::InvalidUrl(_) | Self::UnsupportedScheme(_) => {
                Some("Repository URLs must be http(s)://, file:// or a local path.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::ConnectionRefused(_) | Self::DownloadFailed(_) => true,
            Self::HttpError { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::Timeout { .. } => "network.timeout",
            Self::DownloadFailed(_) => "network.download_failed",
            Self::ConnectionRefused(_) => "network.connection_refused",
            Self::InvalidUrl(_) => "network.invalid_url",
            Self::UnsupportedScheme(_) => "network.unsupported_scheme",
            Self::HttpError { .. } => "network.http_error",
            Self::PartialContentNotSupported { .. } => "network.partial_content_not_supported",
            Self::LocalReadFailed { .. } => "network.local_read_failed",
            Self::TlsError(_) => "network.tls_error",
        };
        Some(code)
    }
}
