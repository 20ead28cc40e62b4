use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Package acquisition events: cache lookups, fetches and expansion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AcquisitionEvent {
    /// Expanded package found in the on-disk cache
    CacheHit {
        package: String,
        checksum: String,
        cache_dir: PathBuf,
    },

    /// Cache did not hold a usable entry; a fetch follows
    CacheMiss {
        package: String,
        checksum: String,
        reason: String,
    },

    /// Fetch of the raw archive started
    Started {
        package: String,
        source: AcquisitionSource,
    },

    /// Archive fetched and split into segments
    Completed {
        package: String,
        source: AcquisitionSource,
        size: u64,
    },

    Failed {
        package: String,
        source: AcquisitionSource,
        failure: super::FailureContext,
    },

    /// Expanded segments moved into their canonical cache location
    Adopted {
        package: String,
        cache_dir: PathBuf,
    },
}

/// Where a package archive is coming from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionSource {
    /// Remote HTTP/HTTPS download
    Remote { url: String },

    /// Archive read from the local filesystem
    Local { path: PathBuf },
}

impl AcquisitionSource {
    /// Classify a package URL by scheme
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("http://") || url.starts_with("https://") {
            Self::Remote {
                url: url.to_string(),
            }
        } else {
            let path = url.strip_prefix("file://").unwrap_or(url);
            Self::Local {
                path: PathBuf::from(path),
            }
        }
    }
}
