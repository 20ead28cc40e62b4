//! Emission metadata carried alongside every event

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::Level;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventMeta {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: EventLevel,
    pub source: EventSource,
    /// The archive a pipeline event concerns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<PackageTag>,
}

impl EventMeta {
    #[must_use]
    pub fn new(level: impl Into<EventLevel>, source: EventSource) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level: level.into(),
            source,
            package: None,
        }
    }

    #[must_use]
    pub fn for_package(mut self, package: PackageTag) -> Self {
        self.package = Some(package);
        self
    }

    /// Checksum of the tagged archive, or empty for untagged events
    #[must_use]
    pub fn correlation(&self) -> &str {
        self.package
            .as_ref()
            .map_or("", |package| package.checksum.as_str())
    }
}

/// Identifies one archive across the events of its fetch, expand and apply
///
/// Two versions of a package share a name but never a checksum, so the
/// checksum is what groups events together.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PackageTag {
    pub name: String,
    pub checksum: String,
}

impl PackageTag {
    #[must_use]
    pub fn new(name: impl Into<String>, checksum: impl fmt::Display) -> Self {
        Self {
            name: name.into(),
            checksum: checksum.to_string(),
        }
    }
}

impl fmt::Display for PackageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.checksum)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<Level> for EventLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::TRACE | Level::DEBUG => EventLevel::Debug,
            Level::INFO => EventLevel::Info,
            Level::WARN => EventLevel::Warn,
            _ => EventLevel::Error,
        }
    }
}

/// Event domain, used as the `source` field of log records
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    General,
    Acquisition,
    Download,
    Install,
    Resolver,
}

impl EventSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Acquisition => "acquisition",
            Self::Download => "download",
            Self::Install => "install",
            Self::Resolver => "resolver",
        }
    }
}
