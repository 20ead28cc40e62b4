//! The control segment: `.PKGINFO` plus install-time scripts

use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use kiln_errors::{Error, PackageError};
use kiln_types::PkgInfo;

pub(crate) const PKGINFO: &str = ".PKGINFO";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlEntry {
    pub name: String,
    pub mode: u32,
    pub data: Vec<u8>,
}

/// Parsed contents of a control segment, held in memory
#[derive(Debug, Clone)]
pub struct ControlSegment {
    entries: Vec<ControlEntry>,
    pkginfo: PkgInfo,
}

fn corrupted(e: impl std::fmt::Display) -> Error {
    PackageError::Corrupted {
        message: format!("control segment: {e}"),
    }
    .into()
}

impl ControlSegment {
    /// Parse a decompressed control tarball
    ///
    /// # Errors
    ///
    /// Returns an error if the tarball is malformed or has no valid
    /// `.PKGINFO`.
    pub fn from_tar(bytes: &[u8]) -> Result<Self, Error> {
        let mut archive = tar::Archive::new(bytes);
        let mut entries = Vec::new();
        for entry in archive.entries().map_err(corrupted)? {
            let mut entry = entry.map_err(corrupted)?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = entry
                .path()
                .map_err(corrupted)?
                .to_string_lossy()
                .trim_start_matches("./")
                .to_string();
            let mode = entry.header().mode().map_err(corrupted)?;
            let mut data = Vec::new();
            entry.read_to_end(&mut data).map_err(corrupted)?;
            entries.push(ControlEntry { name, mode, data });
        }

        let pkginfo = entries
            .iter()
            .find(|e| e.name == PKGINFO)
            .ok_or(PackageError::MissingControl)?;
        let pkginfo = PkgInfo::parse(&String::from_utf8_lossy(&pkginfo.data))?;

        Ok(Self { entries, pkginfo })
    }

    /// Read a gzipped control segment from disk
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not parse.
    pub fn read_gz(path: &Path) -> Result<Self, Error> {
        let compressed = std::fs::read(path).map_err(|e| Error::io_with_path(&e, path))?;
        Self::from_gz(&compressed)
    }

    /// Parse a gzipped control segment held in memory
    ///
    /// # Errors
    ///
    /// Returns an error if the stream does not decompress or parse.
    pub fn from_gz(compressed: &[u8]) -> Result<Self, Error> {
        let mut bytes = Vec::new();
        GzDecoder::new(compressed)
            .read_to_end(&mut bytes)
            .map_err(corrupted)?;
        Self::from_tar(&bytes)
    }

    #[must_use]
    pub fn entries(&self) -> &[ControlEntry] {
        &self.entries
    }

    #[must_use]
    pub fn pkginfo(&self) -> &PkgInfo {
        &self.pkginfo
    }

    /// Install-time scripts: every dot-entry except `.PKGINFO`
    pub fn scripts(&self) -> impl Iterator<Item = &ControlEntry> {
        self.entries
            .iter()
            .filter(|e| e.name.starts_with('.') && e.name != PKGINFO)
    }
}
