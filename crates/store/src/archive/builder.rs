//! Assembling package archives, mostly for tests and local repositories

use std::io::{self, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use kiln_errors::Error;
use kiln_hash::{digest, Checksum, HashAlgorithm};

const TAR_EOF_LEN: usize = 1024;
const BUILD_DATE: u64 = 1_700_000_000;

#[derive(Debug, Clone)]
enum Entry {
    Dir { path: String, mode: u32 },
    File { path: String, mode: u32, contents: Vec<u8> },
    Symlink { path: String, target: String },
    Hardlink { path: String, target: String },
}

/// An assembled archive with the hashes a repository index would carry
#[derive(Debug, Clone)]
pub struct BuiltPackage {
    pub bytes: Vec<u8>,
    /// SHA-1 of the compressed control segment
    pub checksum: Checksum,
    /// Hex SHA-256 of the compressed data segment
    pub datahash: String,
}

/// Builder for apk-format package archives
///
/// ```
/// use kiln_store::PackageBuilder;
///
/// let pkg = PackageBuilder::new("hello", "1.0-r0")
///     .dir("usr/bin", 0o755)
///     .file("usr/bin/hello", 0o755, b"#!/bin/sh\necho hi\n")
///     .build()
///     .unwrap();
/// assert!(pkg.checksum.to_string().starts_with("Q1"));
/// ```
#[derive(Debug, Clone)]
pub struct PackageBuilder {
    name: String,
    version: String,
    arch: String,
    fields: Vec<(String, String)>,
    scripts: Vec<(String, Vec<u8>)>,
    entries: Vec<Entry>,
    signed: bool,
    datahash: Option<String>,
}

impl PackageBuilder {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            arch: "noarch".to_string(),
            fields: Vec::new(),
            scripts: Vec::new(),
            entries: Vec::new(),
            signed: false,
            datahash: None,
        }
    }

    #[must_use]
    pub fn arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    #[must_use]
    pub fn depend(self, dependency: impl Into<String>) -> Self {
        self.field("depend", dependency)
    }

    #[must_use]
    pub fn provides(self, provided: impl Into<String>) -> Self {
        self.field("provides", provided)
    }

    /// Declare trigger paths, space separated
    #[must_use]
    pub fn triggers(self, paths: impl Into<String>) -> Self {
        self.field("triggers", paths)
    }

    /// Append an arbitrary `.PKGINFO` line
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn dir(mut self, path: impl Into<String>, mode: u32) -> Self {
        self.entries.push(Entry::Dir {
            path: path.into(),
            mode,
        });
        self
    }

    #[must_use]
    pub fn file(mut self, path: impl Into<String>, mode: u32, contents: impl AsRef<[u8]>) -> Self {
        self.entries.push(Entry::File {
            path: path.into(),
            mode,
            contents: contents.as_ref().to_vec(),
        });
        self
    }

    #[must_use]
    pub fn symlink(mut self, path: impl Into<String>, target: impl Into<String>) -> Self {
        self.entries.push(Entry::Symlink {
            path: path.into(),
            target: target.into(),
        });
        self
    }

    #[must_use]
    pub fn hardlink(mut self, path: impl Into<String>, target: impl Into<String>) -> Self {
        self.entries.push(Entry::Hardlink {
            path: path.into(),
            target: target.into(),
        });
        self
    }

    /// Add an install script such as `.post-install`
    #[must_use]
    pub fn script(mut self, name: impl Into<String>, contents: impl AsRef<[u8]>) -> Self {
        self.scripts
            .push((name.into(), contents.as_ref().to_vec()));
        self
    }

    /// Prepend a signature segment
    #[must_use]
    pub fn signed(mut self, signed: bool) -> Self {
        self.signed = signed;
        self
    }

    /// Declare this `datahash` instead of the real one
    #[must_use]
    pub fn declared_datahash(mut self, datahash: impl Into<String>) -> Self {
        self.datahash = Some(datahash.into());
        self
    }

    /// # Errors
    ///
    /// Returns an error if a tar or gzip stream cannot be written.
    pub fn build(&self) -> Result<BuiltPackage, Error> {
        let data = gzip(&self.data_tar()?)?;
        let datahash = digest(HashAlgorithm::Sha256, &data).to_hex();

        let control = gzip(&stripped_tar(
            std::iter::once((".PKGINFO".to_string(), 0o644, self.pkginfo(&datahash)))
                .chain(
                    self.scripts
                        .iter()
                        .map(|(name, body)| (name.clone(), 0o755, body.clone())),
                ),
        )?)?;
        let checksum = digest(HashAlgorithm::Sha1, &control);

        let mut bytes = Vec::new();
        if self.signed {
            let signature = gzip(&stripped_tar(std::iter::once((
                ".SIGN.RSA.kiln-test.rsa.pub".to_string(),
                0o644,
                checksum.as_bytes().to_vec(),
            )))?)?;
            bytes.extend_from_slice(&signature);
        }
        bytes.extend_from_slice(&control);
        bytes.extend_from_slice(&data);

        Ok(BuiltPackage {
            bytes,
            checksum,
            datahash,
        })
    }

    /// Build and write the archive to `path`
    ///
    /// # Errors
    ///
    /// Returns an error if building or writing fails.
    pub fn write_to(&self, path: &Path) -> Result<BuiltPackage, Error> {
        let built = self.build()?;
        std::fs::write(path, &built.bytes).map_err(|e| Error::io_with_path(&e, path))?;
        Ok(built)
    }

    fn pkginfo(&self, datahash: &str) -> Vec<u8> {
        let installed: usize = self
            .entries
            .iter()
            .map(|e| match e {
                Entry::File { contents, .. } => contents.len(),
                _ => 0,
            })
            .sum();
        let mut text = format!(
            "pkgname = {}\npkgver = {}\narch = {}\nsize = {installed}\nbuilddate = {BUILD_DATE}\n",
            self.name, self.version, self.arch
        );
        for (key, value) in &self.fields {
            text.push_str(&format!("{key} = {value}\n"));
        }
        let datahash = self.datahash.as_deref().unwrap_or(datahash);
        text.push_str(&format!("datahash = {datahash}\n"));
        text.into_bytes()
    }

    fn data_tar(&self) -> io::Result<Vec<u8>> {
        let mut builder = tar::Builder::new(Vec::new());
        for entry in &self.entries {
            let mut header = tar::Header::new_ustar();
            header.set_mtime(BUILD_DATE);
            header.set_size(0);
            match entry {
                Entry::Dir { path, mode } => {
                    header.set_entry_type(tar::EntryType::Directory);
                    header.set_mode(*mode);
                    builder.append_data(&mut header, path, io::empty())?;
                }
                Entry::File {
                    path,
                    mode,
                    contents,
                } => {
                    let sha1 = digest(HashAlgorithm::Sha1, contents).to_hex();
                    builder.append_pax_extensions([(
                        "APK-TOOLS.checksum.SHA1",
                        sha1.as_bytes(),
                    )])?;
                    header.set_entry_type(tar::EntryType::Regular);
                    header.set_mode(*mode);
                    header.set_size(contents.len() as u64);
                    builder.append_data(&mut header, path, contents.as_slice())?;
                }
                Entry::Symlink { path, target } => {
                    header.set_entry_type(tar::EntryType::Symlink);
                    header.set_mode(0o777);
                    builder.append_link(&mut header, path, target)?;
                }
                Entry::Hardlink { path, target } => {
                    header.set_entry_type(tar::EntryType::Link);
                    header.set_mode(0o644);
                    builder.append_link(&mut header, path, target)?;
                }
            }
        }
        builder.into_inner()
    }
}

/// A tarball without its end-of-archive blocks, as apk writes control
/// and signature segments
fn stripped_tar(entries: impl Iterator<Item = (String, u32, Vec<u8>)>) -> io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, mode, body) in entries {
        let mut header = tar::Header::new_ustar();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mtime(BUILD_DATE);
        header.set_mode(mode);
        header.set_size(body.len() as u64);
        builder.append_data(&mut header, name, body.as_slice())?;
    }
    let mut bytes = builder.into_inner()?;
    bytes.truncate(bytes.len().saturating_sub(TAR_EOF_LEN));
    Ok(bytes)
}

fn gzip(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}
