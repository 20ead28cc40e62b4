//! Source dispatch and HTTP response validation

use std::path::PathBuf;

use kiln_errors::{Error, NetworkError};
use reqwest::StatusCode;
use url::Url;

/// Where an archive is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchSource {
    /// Read in place from the local filesystem
    Local(PathBuf),
    /// Spooled over `http` or `https`
    Http(Url),
}

impl FetchSource {
    /// Dispatch on the scheme; strings without one are local paths
    ///
    /// # Errors
    ///
    /// Returns `InvalidUrl` for malformed URLs and `UnsupportedScheme` for
    /// anything other than `file`, `http` and `https`.
    pub fn parse(url: &str) -> Result<Self, Error> {
        if !url.contains("://") {
            return Ok(Self::Local(PathBuf::from(url)));
        }

        let parsed = Url::parse(url).map_err(|e| NetworkError::InvalidUrl(e.to_string()))?;
        match parsed.scheme() {
            "http" | "https" => Ok(Self::Http(parsed)),
            "file" => parsed
                .to_file_path()
                .map(Self::Local)
                .map_err(|()| NetworkError::InvalidUrl(url.to_string()).into()),
            scheme => Err(NetworkError::UnsupportedScheme(scheme.to_string()).into()),
        }
    }
}

/// How to treat the body of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BodyMode {
    /// Append to what is already spooled
    Append,
    /// Discard the spool and write from offset zero
    Restart,
}

/// Check the status against what was asked for
///
/// A resumed request must be answered with 206; a plain 200 means the
/// server ignored the range and sent the whole body again.
pub(super) fn validate_response(
    url: &str,
    status: StatusCode,
    resuming: bool,
) -> Result<BodyMode, Error> {
    match status {
        StatusCode::PARTIAL_CONTENT if resuming => Ok(BodyMode::Append),
        StatusCode::PARTIAL_CONTENT => Err(NetworkError::HttpError {
            status: status.as_u16(),
            message: "unexpected partial content".to_string(),
        }
        .into()),
        StatusCode::OK if resuming => Ok(BodyMode::Restart),
        StatusCode::RANGE_NOT_SATISFIABLE if resuming => {
            Err(NetworkError::PartialContentNotSupported {
                url: url.to_string(),
            }
            .into())
        }
        status if status.is_success() => Ok(BodyMode::Append),
        status => Err(NetworkError::HttpError {
            status: status.as_u16(),
            message: status.to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn dispatches_on_scheme() {
        assert_eq!(
            FetchSource::parse("/srv/repo/x86_64/zlib-1.3.1-r0.apk").unwrap(),
            FetchSource::Local(PathBuf::from("/srv/repo/x86_64/zlib-1.3.1-r0.apk"))
        );
        assert_eq!(
            FetchSource::parse("file:///srv/repo/x86_64/zlib.apk").unwrap(),
            FetchSource::Local(Path::new("/srv/repo/x86_64/zlib.apk").to_path_buf())
        );
        assert!(matches!(
            FetchSource::parse("https://dl.example.org/main/x86_64/zlib.apk").unwrap(),
            FetchSource::Http(_)
        ));
        assert!(matches!(
            FetchSource::parse("ftp://mirror.example.org/zlib.apk").unwrap_err(),
            Error::Network(NetworkError::UnsupportedScheme(ref s)) if s == "ftp"
        ));
    }

    #[test]
    fn resume_requires_partial_content() {
        let url = "https://dl.example.org/a.apk";
        assert_eq!(
            validate_response(url, StatusCode::PARTIAL_CONTENT, true).unwrap(),
            BodyMode::Append
        );
        assert_eq!(
            validate_response(url, StatusCode::OK, true).unwrap(),
            BodyMode::Restart
        );
        assert_eq!(
            validate_response(url, StatusCode::OK, false).unwrap(),
            BodyMode::Append
        );
        assert!(validate_response(url, StatusCode::PARTIAL_CONTENT, false).is_err());
        assert!(matches!(
            validate_response(url, StatusCode::RANGE_NOT_SATISFIABLE, true).unwrap_err(),
            Error::Network(NetworkError::PartialContentNotSupported { .. })
        ));
        assert!(matches!(
            validate_response(url, StatusCode::NOT_FOUND, false).unwrap_err(),
            Error::Network(NetworkError::HttpError { status: 404, .. })
        ));
    }
}
