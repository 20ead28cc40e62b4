//! Installation pipeline error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum InstallError {
    #[error("cannot install due to conflict with {package}")]
    Conflict { package: String },

    #[error("package not found: {package}")]
    PackageNotFound { package: String },

    #[error("dependency resolution failed: {message}")]
    ResolutionFailed { message: String },

    #[error("expansion of {package} failed: {source}")]
    ExpansionFailed { package: String, source: Box<crate::Error> },

    #[error("installing {package} failed: {source}")]
    ApplyFailed { package: String, source: Box<crate::Error> },

    #[error("filesystem operation failed: {operation} on {path}: {message}")]
    FilesystemError {
        operation: String,
        path: String,
        message: String,
    },

    #[error("concurrency error: {message}")]
    ConcurrencyError { message: String },

    #[error("task execution failed: {message}")]
    TaskError { message: String },
}

impl InstallError {
    /// Build a filesystem error from an `io::Error`.
    #[must_use]
    pub fn filesystem(
        operation: &str,
        path: impl AsRef<std::path::Path>,
        err: &std::io::Error,
    ) -> Self {
        Self::FilesystemError {
            operation: operation.to_string(),
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }
}

impl UserFacingError for InstallError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Conflict { .. } => {
                Some("Remove the conflicting package from the world file before installing.")
            }
            Self::PackageNotFound { .. } => {
                Some("Check the package name and the configured repositories.")
            }
            Self::ExpansionFailed { source, .. } | Self::ApplyFailed { source, .. } => {
                source.user_hint()
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Self::ExpansionFailed { source, .. } => source.is_retryable(),
            Self::ConcurrencyError { .. } => true,
            _ => false,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::Conflict { .. } => "install.conflict",
            Self::PackageNotFound { .. } => "install.package_not_found",
            Self::ResolutionFailed { .. } => "install.resolution_failed",
            Self::ExpansionFailed { .. } => "install.expansion_failed",
            Self::ApplyFailed { .. } => "install.apply_failed",
            Self::FilesystemError { .. } => "install.filesystem_error",
            Self::ConcurrencyError { .. } => "install.concurrency_error",
            Self::TaskError { .. } => "install.task_error",
        };
        Some(code)
    }
}
