//! Serializable operation results

use kiln_types::{Package, RepositoryPackage};
use serde::Serialize;

/// Identity of a package as shown to users
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PackageSummary {
    pub name: String,
    pub version: String,
    pub arch: String,
    pub checksum: String,
}

impl From<&Package> for PackageSummary {
    fn from(package: &Package) -> Self {
        Self {
            name: package.name.clone(),
            version: package.version.clone(),
            arch: package.arch.clone(),
            checksum: package.checksum.to_string(),
        }
    }
}

impl From<&RepositoryPackage> for PackageSummary {
    fn from(package: &RepositoryPackage) -> Self {
        Self {
            name: package.name.clone(),
            version: package.version.clone(),
            arch: package.arch.clone(),
            checksum: package.checksum.to_string(),
        }
    }
}

/// Outcome of fixating a world
#[derive(Clone, Debug, Serialize)]
pub struct InstallReport {
    /// Every package of the world, in install order
    pub packages: Vec<PackageSummary>,
    /// What was done about the legacy database location
    pub db_location: String,
}
