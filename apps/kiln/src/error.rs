//! CLI error handling

use std::fmt;

use kiln_errors::UserFacingError;

/// CLI-specific error type
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded or merged
    Config(kiln_errors::Error),
    /// Operations error
    Ops(kiln_errors::Error),
    /// I/O error
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "Configuration error: {e}"),
            CliError::Ops(e) => {
                let message = e.user_message();
                write!(f, "{message}")?;
                if let Some(code) = e.user_code() {
                    write!(f, "\n  Code: {code}")?;
                }
                if let Some(hint) = e.user_hint() {
                    write!(f, "\n  Hint: {hint}")?;
                }
                if e.is_retryable() {
                    write!(f, "\n  Retry: safe to retry this operation.")?;
                }
                Ok(())
            }
            CliError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) | CliError::Ops(e) => Some(e),
            CliError::Io(e) => Some(e),
        }
    }
}

impl From<kiln_errors::Error> for CliError {
    fn from(e: kiln_errors::Error) -> Self {
        CliError::Ops(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_errors::{InstallError, OpsError};

    #[test]
    fn ops_errors_carry_code_and_hint() {
        let err = CliError::from(kiln_errors::Error::from(OpsError::NoRepositories));
        let text = err.to_string();
        assert!(text.contains("\n  Code: ops.no_repositories"));
        assert!(text.contains("\n  Hint: Add repositories"));
    }

    #[test]
    fn conflicts_are_not_retryable() {
        let err = CliError::from(kiln_errors::Error::from(InstallError::Conflict {
            package: "sudo".to_string(),
        }));
        assert!(!err.to_string().contains("Retry:"));
    }
}
