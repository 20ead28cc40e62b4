use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Install pipeline events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InstallEvent {
    BatchStarted {
        packages: usize,
        workers: usize,
    },

    /// Sequential apply of the package at `index` started
    Started {
        package: String,
        version: String,
        index: usize,
    },

    /// Package already recorded as installed
    Skipped {
        package: String,
        version: String,
    },

    Completed {
        package: String,
        version: String,
        installed_files: usize,
    },

    Failed {
        package: String,
        phase: InstallPhase,
        failure: super::FailureContext,
    },

    /// File list persisted after ownership deduplication
    Finalized {
        package: String,
        files_kept: usize,
        files_dropped: usize,
    },

    BatchCompleted {
        installed: usize,
        skipped: usize,
        duration: Duration,
    },

    /// `lib/apk` reconciled with the canonical database location
    DatabaseLocationResolved {
        path: PathBuf,
        action: String,
    },
}

/// Pipeline phase an install failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallPhase {
    Expand,
    Apply,
    Finalize,
}
