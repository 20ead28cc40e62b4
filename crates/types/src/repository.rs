//! Packages as advertised by repository indexes

use kiln_hash::Checksum;
use std::fmt;
use std::sync::Arc;

/// Anything the engine can fetch, expand and install.
///
/// Identity for caching is the checksum, never the URL.
pub trait InstallablePackage: fmt::Debug + Send + Sync {
    /// Fully resolved location of the archive
    fn url(&self) -> String;

    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Checksum of the control segment
    fn checksum(&self) -> &Checksum;
}

/// Shared handle used throughout the install pipeline
pub type PackageRef = Arc<dyn InstallablePackage>;

/// A configured package repository
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Repository {
    /// Base URL or local path, without the architecture component
    pub uri: String,
}

impl Repository {
    pub fn new(uri: impl Into<String>) -> Self {
        let uri = uri.into();
        Self {
            uri: uri.trim_end_matches('/').to_string(),
        }
    }

    /// Location of the index for `arch`
    #[must_use]
    pub fn index_url(&self, arch: &str) -> String {
        format!("{}/{arch}/APKINDEX.tar.gz", self.uri)
    }
}

/// Package entry of a repository index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryPackage {
    pub name: String,
    pub version: String,
    pub arch: String,
    pub checksum: Checksum,
    pub description: String,
    pub size: u64,
    pub installed_size: u64,
    pub dependencies: Vec<String>,
    pub provides: Vec<String>,
    pub origin: String,
    pub repository: Repository,
}

impl RepositoryPackage {
    /// Archive file name within the repository
    #[must_use]
    pub fn filename(&self) -> String {
        format!("{}-{}.apk", self.name, self.version)
    }
}

impl InstallablePackage for RepositoryPackage {
    fn url(&self) -> String {
        format!("{}/{}/{}", self.repository.uri, self.arch, self.filename())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn checksum(&self) -> &Checksum {
        &self.checksum
    }
}

impl fmt::Display for RepositoryPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}
