//! Lazily indexed view of a decompressed data tarball

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use kiln_errors::{Error, PackageError};
use kiln_hash::{Checksum, HashAlgorithm, HashingReader};
use kiln_platform::ContentSource;
use kiln_types::{EntryKind, FileHeader};
use once_cell::sync::OnceCell;

const PAX_SHA1: &str = "APK-TOOLS.checksum.SHA1";

/// One entry of the data tarball
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataEntry {
    pub header: FileHeader,
    /// Offset of the entry's contents within the tarball
    pub offset: u64,
}

#[derive(Debug)]
struct TreeIndex {
    entries: Vec<DataEntry>,
    by_path: HashMap<String, usize>,
}

/// Navigable file tree over a data tarball
///
/// The tarball is scanned once, on first access. Contents are never
/// buffered; they are read straight from the tarball at the recorded
/// offsets.
#[derive(Debug)]
pub struct DataTree {
    path: PathBuf,
    index: OnceCell<TreeIndex>,
}

fn corrupted(e: impl std::fmt::Display) -> Error {
    PackageError::Corrupted {
        message: format!("data segment: {e}"),
    }
    .into()
}

impl DataTree {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            index: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.index.get().is_some()
    }

    fn index(&self) -> Result<&TreeIndex, Error> {
        self.index.get_or_try_init(|| build_index(&self.path))
    }

    /// Entries in archive order
    ///
    /// # Errors
    ///
    /// Returns an error if the tarball cannot be read or is malformed.
    pub fn entries(&self) -> Result<&[DataEntry], Error> {
        Ok(&self.index()?.entries)
    }

    /// # Errors
    ///
    /// Returns an error if the tarball cannot be indexed.
    pub fn get(&self, path: &str) -> Result<Option<&DataEntry>, Error> {
        let index = self.index()?;
        Ok(index
            .by_path
            .get(normalize(path).as_str())
            .map(|&i| &index.entries[i]))
    }

    /// Open the contents of a regular file
    ///
    /// # Errors
    ///
    /// Returns `PathNotFound` for unknown or non-file entries, or an I/O
    /// error if the tarball cannot be opened.
    pub fn open(&self, path: &str) -> Result<io::Take<File>, Error> {
        let entry = self
            .get(path)?
            .filter(|e| e.header.kind == EntryKind::File)
            .ok_or_else(|| kiln_errors::StorageError::PathNotFound {
                path: path.to_string(),
            })?;
        self.open_entry(entry)
    }

    /// # Errors
    ///
    /// Returns an I/O error if the tarball cannot be opened.
    pub fn open_entry(&self, entry: &DataEntry) -> Result<io::Take<File>, Error> {
        let mut file = File::open(&self.path).map_err(|e| Error::io_with_path(&e, &self.path))?;
        file.seek(SeekFrom::Start(entry.offset))?;
        Ok(file.take(entry.header.size))
    }

    /// A lazy reference to the contents of `entry`
    #[must_use]
    pub fn content_source(&self, entry: &DataEntry) -> ContentSource {
        ContentSource {
            archive: self.path.clone(),
            offset: entry.offset,
            size: entry.header.size,
        }
    }
}

/// Tar member name to root-relative path: no `./`, no leading or trailing `/`
fn normalize(name: &str) -> String {
    let name = name.trim_start_matches("./").trim_start_matches('/');
    name.trim_end_matches('/').to_string()
}

fn kind_of(entry_type: tar::EntryType) -> Option<EntryKind> {
    match entry_type {
        tar::EntryType::Directory => Some(EntryKind::Directory),
        tar::EntryType::Regular | tar::EntryType::Continuous => Some(EntryKind::File),
        tar::EntryType::Symlink => Some(EntryKind::Symlink),
        tar::EntryType::Link => Some(EntryKind::Hardlink),
        _ => None,
    }
}

fn pax_checksum<R: Read>(entry: &mut tar::Entry<'_, R>) -> Result<Option<Checksum>, Error> {
    let Some(extensions) = entry.pax_extensions().map_err(corrupted)? else {
        return Ok(None);
    };
    for extension in extensions {
        let extension = extension.map_err(corrupted)?;
        if extension.key().map_err(corrupted)? == PAX_SHA1 {
            let bytes = hex::decode(extension.value_bytes()).map_err(corrupted)?;
            return Ok(Some(Checksum::from_digest(HashAlgorithm::Sha1, &bytes)?));
        }
    }
    Ok(None)
}

fn build_index(path: &Path) -> Result<TreeIndex, Error> {
    let file = File::open(path).map_err(|e| Error::io_with_path(&e, path))?;
    let mut archive = tar::Archive::new(BufReader::new(file));
    let mut entries = Vec::new();
    let mut by_path = HashMap::new();

    for entry in archive.entries().map_err(corrupted)? {
        let mut entry = entry.map_err(corrupted)?;
        let Some(kind) = kind_of(entry.header().entry_type()) else {
            continue;
        };

        let raw = entry.path().map_err(corrupted)?.into_owned();
        if raw
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(corrupted(format!(
                "entry escapes the root: {}",
                raw.display()
            )));
        }
        let name = normalize(&raw.to_string_lossy());
        if name.is_empty() {
            continue;
        }

        let link_target = entry
            .link_name()
            .map_err(corrupted)?
            .map(|p| p.to_string_lossy().into_owned());
        let header = entry.header();
        let mode = header.mode().map_err(corrupted)?;
        let uid = header.uid().map_err(corrupted)?;
        let gid = header.gid().map_err(corrupted)?;
        let size = entry.size();
        let offset = entry.raw_file_position();

        let checksum = if kind == EntryKind::File {
            match pax_checksum(&mut entry)? {
                Some(checksum) => Some(checksum),
                None => {
                    let mut reader = HashingReader::new(&mut entry, HashAlgorithm::Sha1);
                    io::copy(&mut reader, &mut io::sink()).map_err(corrupted)?;
                    Some(reader.finish())
                }
            }
        } else {
            None
        };

        by_path.insert(name.clone(), entries.len());
        entries.push(DataEntry {
            header: FileHeader {
                path: name,
                kind,
                mode,
                uid,
                gid,
                size: if kind == EntryKind::File { size } else { 0 },
                link_target,
                checksum,
            },
            offset,
        });
    }

    Ok(TreeIndex { entries, by_path })
}
