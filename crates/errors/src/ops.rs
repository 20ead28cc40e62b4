//! Operation orchestration error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum OpsError {
    #[error("initialization failed: {message}")]
    InitializationFailed { message: String },

    #[error("no repositories configured")]
    NoRepositories,

    #[error("no packages specified")]
    NoPackagesSpecified,

    #[error("cannot relocate package database at {path}: {reason}")]
    DatabaseLocation { path: String, reason: String },

    #[error("repository index {url} is invalid: {message}")]
    InvalidIndex { url: String, message: String },
}

impl UserFacingError for OpsError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::NoRepositories => {
                Some("Add repositories to etc/apk/repositories or the [repository] config section.")
            }
            Self::DatabaseLocation { .. } => {
                Some("Move files out of lib/apk so it can become a link to usr/lib/apk.")
            }
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::InitializationFailed { .. } => "ops.initialization_failed",
            Self::NoRepositories => "ops.no_repositories",
            Self::NoPackagesSpecified => "ops.no_packages_specified",
            Self::DatabaseLocation { .. } => "ops.database_location",
            Self::InvalidIndex { .. } => "ops.invalid_index",
        };
        Some(code)
    }
}
