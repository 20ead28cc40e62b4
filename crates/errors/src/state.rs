//! Installed-database error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum StateError {
    #[error("database error: {message}")]
    DatabaseError { message: String },

    #[error("database corrupted at line {line}: {message}")]
    Corrupted { line: usize, message: String },

    #[error("scripts archive update failed: {message}")]
    ScriptsArchive { message: String },

    #[error("world file is invalid: {message}")]
    InvalidWorld { message: String },
}

impl UserFacingError for StateError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::DatabaseError { .. } => "state.database_error",
            Self::Corrupted { .. } => "state.corrupted",
            Self::ScriptsArchive { .. } => "state.scripts_archive",
            Self::InvalidWorld { .. } => "state.invalid_world",
        };
        Some(code)
    }
}
