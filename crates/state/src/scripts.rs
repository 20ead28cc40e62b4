//! `usr/lib/apk/db/scripts.tar`

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_config::constants::SCRIPTS_TAR;
use kiln_errors::{Error, StateError};
use kiln_platform::TargetFs;
use kiln_types::Package;

use crate::io_error;

/// Name of a script inside the archive: `<name>-<version>.Q1<b64>.<script>`
#[must_use]
pub fn script_entry_name(package: &Package, script: &str) -> String {
    let script = script.trim_start_matches('.');
    format!(
        "{}-{}.{}.{script}",
        package.name, package.version, package.checksum
    )
}

fn archive_error(e: impl std::fmt::Display) -> Error {
    StateError::ScriptsArchive {
        message: e.to_string(),
    }
    .into()
}

/// Archive of every installed package's install scripts
///
/// Scripts are only recorded, never executed.
#[derive(Debug, Clone)]
pub struct ScriptsArchive {
    fs: Arc<dyn TargetFs>,
}

impl ScriptsArchive {
    pub fn new(fs: Arc<dyn TargetFs>) -> Self {
        Self { fs }
    }

    fn read_existing(&self) -> Result<Vec<u8>, Error> {
        match self.fs.read(Path::new(SCRIPTS_TAR)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(io_error(SCRIPTS_TAR)(e)),
        }
    }

    /// Replace the archive with an empty one
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be written.
    pub fn initialize(&self) -> Result<(), Error> {
        let bytes = tar::Builder::new(Vec::new())
            .into_inner()
            .map_err(archive_error)?;
        self.fs
            .write(Path::new(SCRIPTS_TAR), &bytes, 0o644)
            .map_err(io_error(SCRIPTS_TAR))
    }

    /// Entry names currently in the archive
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be read or is malformed.
    pub fn entries(&self) -> Result<Vec<String>, Error> {
        let existing = self.read_existing()?;
        let mut archive = tar::Archive::new(existing.as_slice());
        let mut names = Vec::new();
        for entry in archive.entries().map_err(archive_error)? {
            let entry = entry.map_err(archive_error)?;
            names.push(entry.path().map_err(archive_error)?.display().to_string());
        }
        Ok(names)
    }

    /// Add `scripts` (name, mode, contents) of `package` to the archive
    ///
    /// Entries are stamped with `mtime`, or the current time when unset.
    /// Returns the number of scripts written.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be read, rebuilt or written.
    pub fn append<'a>(
        &self,
        package: &Package,
        scripts: impl IntoIterator<Item = (&'a str, u32, &'a [u8])>,
        mtime: Option<u64>,
    ) -> Result<usize, Error> {
        let scripts: Vec<_> = scripts.into_iter().collect();
        if scripts.is_empty() {
            return Ok(0);
        }

        let existing = self.read_existing()?;
        let mut builder = tar::Builder::new(Vec::new());
        let mut archive = tar::Archive::new(existing.as_slice());
        for entry in archive.entries().map_err(archive_error)? {
            let mut entry = entry.map_err(archive_error)?;
            let path: PathBuf = entry.path().map_err(archive_error)?.into_owned();
            let mut header = entry.header().clone();
            builder
                .append_data(&mut header, path, &mut entry)
                .map_err(archive_error)?;
        }

        let mtime = mtime.unwrap_or_else(|| {
            u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
        });
        for (name, mode, contents) in &scripts {
            let mut header = tar::Header::new_ustar();
            header.set_entry_type(tar::EntryType::Regular);
            header.set_mode(*mode);
            header.set_uid(0);
            header.set_gid(0);
            header.set_mtime(mtime);
            header.set_size(contents.len() as u64);
            builder
                .append_data(&mut header, script_entry_name(package, name), *contents)
                .map_err(archive_error)?;
        }

        let bytes = builder.into_inner().map_err(archive_error)?;
        self.fs
            .write(Path::new(SCRIPTS_TAR), &bytes, 0o644)
            .map_err(io_error(SCRIPTS_TAR))?;
        Ok(scripts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_hash::{digest, HashAlgorithm};
    use kiln_platform::MemFs;

    fn package(name: &str) -> Package {
        Package {
            name: name.to_string(),
            version: "2.0-r3".to_string(),
            arch: "aarch64".to_string(),
            description: String::new(),
            url: String::new(),
            license: String::new(),
            origin: String::new(),
            maintainer: String::new(),
            commit: String::new(),
            build_time: None,
            installed_size: 0,
            size: 0,
            checksum: digest(HashAlgorithm::Sha1, name.as_bytes()),
            dependencies: vec![],
            provides: vec![],
            replaces: vec![],
            triggers: vec![],
            datahash: None,
        }
    }

    #[test]
    fn entry_names_carry_package_identity() {
        let pkg = package("busybox");
        assert_eq!(
            script_entry_name(&pkg, ".post-install"),
            format!("busybox-2.0-r3.{}.post-install", pkg.checksum)
        );
    }

    #[test]
    fn appends_preserve_earlier_entries() {
        let fs = MemFs::new();
        fs.create_dir_all(Path::new("usr/lib/apk/db"), 0o755)
            .unwrap();
        let archive = ScriptsArchive::new(Arc::new(fs));

        let first = package("busybox");
        let written = archive
            .append(
                &first,
                [
                    (".pre-install", 0o755, &b"#!/bin/sh\n"[..]),
                    (".post-install", 0o755, &b"#!/bin/sh\n"[..]),
                ],
                Some(0),
            )
            .unwrap();
        assert_eq!(written, 2);

        let second = package("alpine-baselayout");
        archive
            .append(&second, [(".trigger", 0o755, &b"#!/bin/sh\n"[..])], None)
            .unwrap();
        assert_eq!(
            archive
                .append(&second, Vec::<(&str, u32, &[u8])>::new(), None)
                .unwrap(),
            0
        );

        assert_eq!(
            archive.entries().unwrap(),
            vec![
                script_entry_name(&first, ".pre-install"),
                script_entry_name(&first, ".post-install"),
                script_entry_name(&second, ".trigger"),
            ]
        );
    }

    #[test]
    fn initialized_archive_is_empty_and_readable() {
        let fs = Arc::new(MemFs::new());
        fs.create_dir_all(Path::new("usr/lib/apk/db"), 0o755)
            .unwrap();
        let archive = ScriptsArchive::new(fs.clone());
        archive.initialize().unwrap();

        assert!(archive.entries().unwrap().is_empty());
        assert_eq!(fs.read(Path::new(SCRIPTS_TAR)).unwrap().len(), 1024);
    }
}
