//! Retry policy and fetch results

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempPath;

/// Retry configuration for HTTP fetches
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts after the first one
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// A fetched archive readable at a local path
///
/// Remote sources are spooled to a temporary file that is removed when this
/// value is dropped; local sources are referenced in place.
#[derive(Debug)]
pub struct FetchedArchive {
    path: PathBuf,
    size: u64,
    spool: Option<TempPath>,
}

impl FetchedArchive {
    pub(crate) fn local(path: PathBuf, size: u64) -> Self {
        Self {
            path,
            size,
            spool: None,
        }
    }

    pub(crate) fn spooled(spool: TempPath, size: u64) -> Self {
        Self {
            path: spool.to_path_buf(),
            size,
            spool: Some(spool),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether the archive lives in a temporary spool file
    #[must_use]
    pub fn is_spooled(&self) -> bool {
        self.spool.is_some()
    }
}
