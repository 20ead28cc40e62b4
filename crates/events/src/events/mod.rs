use serde::{Deserialize, Serialize};

use crate::EventSource;
use kiln_errors::UserFacingError;

/// Structured failure information shared across domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short user-facing message.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    pub retryable: bool,
}

impl FailureContext {
    #[must_use]
    pub fn new(
        code: Option<impl Into<String>>,
        message: impl Into<String>,
        hint: Option<impl Into<String>>,
        retryable: bool,
    ) -> Self {
        Self {
            code: code.map(Into::into),
            message: message.into(),
            hint: hint.map(Into::into),
            retryable,
        }
    }

    /// Build failure context from a `UserFacingError` implementation.
    #[must_use]
    pub fn from_error<E: UserFacingError + ?Sized>(error: &E) -> Self {
        Self::new(
            error.user_code(),
            error.user_message().into_owned(),
            error.user_hint(),
            error.is_retryable(),
        )
    }
}

pub mod acquisition;
pub mod download;
pub mod general;
pub mod install;
pub mod resolver;

pub use acquisition::*;
pub use download::*;
pub use general::*;
pub use install::*;
pub use resolver::*;

/// Top-level application event enum that aggregates all domain-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    General(GeneralEvent),

    /// Cache lookups, fetches and archive expansion
    Acquisition(AcquisitionEvent),

    /// Transport-level transfer events
    Download(DownloadEvent),

    /// Ordered apply, finalization and database bookkeeping
    Install(InstallEvent),

    Resolver(ResolverEvent),
}

impl AppEvent {
    /// Identify the source domain for this event (used for metadata/logging).
    #[must_use]
    pub fn event_source(&self) -> EventSource {
        match self {
            Self::General(_) => EventSource::General,
            Self::Acquisition(_) => EventSource::Acquisition,
            Self::Download(_) => EventSource::Download,
            Self::Install(_) => EventSource::Install,
            Self::Resolver(_) => EventSource::Resolver,
        }
    }

    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self {
            Self::General(GeneralEvent::Error { .. } | GeneralEvent::OperationFailed { .. })
            | Self::Acquisition(AcquisitionEvent::Failed { .. })
            | Self::Download(DownloadEvent::Failed { .. })
            | Self::Install(InstallEvent::Failed { .. }) => Level::ERROR,

            Self::General(GeneralEvent::Warning { .. })
            | Self::Download(DownloadEvent::Retrying { .. } | DownloadEvent::Resuming { .. }) => {
                Level::WARN
            }

            Self::General(GeneralEvent::DebugLog { .. })
            | Self::Acquisition(
                AcquisitionEvent::CacheHit { .. }
                | AcquisitionEvent::CacheMiss { .. }
                | AcquisitionEvent::Adopted { .. },
            )
            | Self::Download(DownloadEvent::Started { .. })
            | Self::Install(InstallEvent::Finalized { .. })
            | Self::Resolver(
                ResolverEvent::IndexLoaded { .. } | ResolverEvent::PackageExcluded { .. },
            ) => Level::DEBUG,

            _ => Level::INFO,
        }
    }

    /// Get the log target for this event (for structured logging)
    #[must_use]
    pub fn log_target(&self) -> &'static str {
        match self {
            Self::General(_) => "kiln::events::general",
            Self::Acquisition(_) => "kiln::events::acquisition",
            Self::Download(_) => "kiln::events::download",
            Self::Install(_) => "kiln::events::install",
            Self::Resolver(_) => "kiln::events::resolver",
        }
    }
}
