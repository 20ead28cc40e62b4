//! A package split into its on-disk segments

use std::path::{Path, PathBuf};

use kiln_errors::Error;
use kiln_hash::Checksum;
use kiln_types::{Package, PkgInfo};
use tempfile::TempDir;

use crate::control::ControlSegment;
use crate::tarfs::DataTree;

/// One gzip member of a package archive, stored as its own file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub path: PathBuf,
    /// Compressed size in bytes
    pub size: u64,
}

/// Result of expanding a package archive
///
/// Freshly expanded packages live in a scratch directory that is removed
/// when the value is dropped, unless the files were adopted into the cache
/// first.
#[derive(Debug)]
pub struct ExpandedPackage {
    pub(crate) control: Segment,
    pub(crate) control_hash: Checksum,
    pub(crate) control_segment: ControlSegment,
    pub(crate) signature: Option<Segment>,
    pub(crate) signature_hash: Option<Checksum>,
    pub(crate) data: Segment,
    pub(crate) data_hash: String,
    pub(crate) tree: DataTree,
    pub(crate) temp_dir: Option<TempDir>,
}

impl ExpandedPackage {
    #[must_use]
    pub fn control_path(&self) -> &Path {
        &self.control.path
    }

    /// SHA-1 of the compressed control segment; the package identity
    #[must_use]
    pub fn control_hash(&self) -> &Checksum {
        &self.control_hash
    }

    #[must_use]
    pub fn signature(&self) -> Option<&Segment> {
        self.signature.as_ref()
    }

    #[must_use]
    pub fn signature_hash(&self) -> Option<&Checksum> {
        self.signature_hash.as_ref()
    }

    #[must_use]
    pub fn data_path(&self) -> &Path {
        &self.data.path
    }

    /// Lowercase hex SHA-256 of the compressed data segment
    #[must_use]
    pub fn data_hash(&self) -> &str {
        &self.data_hash
    }

    /// Decompressed data tarball
    #[must_use]
    pub fn tar_path(&self) -> &Path {
        self.tree.path()
    }

    /// Total compressed size of every segment
    #[must_use]
    pub fn size(&self) -> u64 {
        self.control.size + self.data.size + self.signature.as_ref().map_or(0, |s| s.size)
    }

    #[must_use]
    pub fn control(&self) -> &ControlSegment {
        &self.control_segment
    }

    #[must_use]
    pub fn pkginfo(&self) -> &PkgInfo {
        self.control_segment.pkginfo()
    }

    #[must_use]
    pub fn data(&self) -> &DataTree {
        &self.tree
    }

    /// Whether the segments are owned by the cache rather than a scratch
    /// directory
    #[must_use]
    pub fn is_adopted(&self) -> bool {
        self.temp_dir.is_none()
    }

    /// Installed-package record built from `.PKGINFO`
    ///
    /// # Errors
    ///
    /// Returns an error if required metadata is missing or malformed.
    pub fn package_info(&self) -> Result<Package, Error> {
        self.pkginfo()
            .to_package(self.control_hash.clone(), self.size())
    }
}
