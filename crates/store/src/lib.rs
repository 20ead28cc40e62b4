#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Package archives and the content-addressed package cache
//!
//! An apk archive is a concatenation of gzip members: an optional
//! signature, the control segment and the data segment. [`expand_archive`]
//! splits it into one file per segment plus the decompressed data tarball;
//! [`PackageCache`] stores those files under names derived from their
//! hashes so later runs can skip fetching and decompression entirely.

pub mod archive;
mod cache;
mod control;
mod expanded;
mod tarfs;

pub use archive::{expand_archive, scratch_dir, BuiltPackage, PackageBuilder};
pub use cache::PackageCache;
pub use control::{ControlEntry, ControlSegment};
pub use expanded::{ExpandedPackage, Segment};
pub use tarfs::{DataEntry, DataTree};

/// File names of a cache entry, in the order they are adopted
pub mod names {
    #[must_use]
    pub fn control(hex: &str) -> String {
        format!("{hex}.ctl.tar.gz")
    }

    #[must_use]
    pub fn signature(hex: &str) -> String {
        format!("{hex}.sig.tar.gz")
    }

    #[must_use]
    pub fn data(datahash: &str) -> String {
        format!("{datahash}.dat.tar.gz")
    }

    /// The decompressed data tarball
    #[must_use]
    pub fn data_tar(datahash: &str) -> String {
        format!("{datahash}.dat.tar")
    }
}
