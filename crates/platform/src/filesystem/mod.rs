//! The `TargetFs` trait and its supporting types

use std::fmt::Debug;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use kiln_types::FileHeader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    File,
    Symlink,
}

/// Metadata of an entry, without following a trailing symlink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsMetadata {
    pub kind: FileKind,
    pub mode: u32,
    pub size: u64,
}

impl FsMetadata {
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: FileKind,
}

/// File contents that stay where they are until read
///
/// Points at `size` bytes starting at `offset` inside `archive`, which is
/// a decompressed data tarball owned by the package cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSource {
    pub archive: PathBuf,
    pub offset: u64,
    pub size: u64,
}

impl ContentSource {
    /// Read the referenced bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be opened or is shorter than
    /// the reference claims.
    pub fn read(&self) -> io::Result<Vec<u8>> {
        use std::io::{Seek, SeekFrom};

        let mut file = std::fs::File::open(&self.archive)?;
        file.seek(SeekFrom::Start(self.offset))?;
        let len = usize::try_from(self.size)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "entry too large"))?;
        let mut buf = vec![0; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Optional fast path for installing an entry without copying its data
pub trait WriteHeader: Send + Sync {
    /// Install `header`, taking regular-file contents from `source`.
    ///
    /// Returns `Ok(false)` when the entry was not handled and the caller
    /// should fall back to writing it itself.
    ///
    /// # Errors
    ///
    /// Returns an error when the entry cannot be recorded.
    fn write_header(&self, header: &FileHeader, source: Option<&ContentSource>)
        -> io::Result<bool>;
}

/// A filesystem rooted at the installation target
///
/// Paths are relative to the root; a leading `/` is ignored. Operations
/// never follow a symlink in the final path component unless stated.
pub trait TargetFs: Debug + Send + Sync {
    fn symlink_metadata(&self, path: &Path) -> io::Result<FsMetadata>;

    /// Create one directory; the parent must exist
    fn create_dir(&self, path: &Path, mode: u32) -> io::Result<()>;

    fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()>;

    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Create or replace a regular file
    fn write(&self, path: &Path, contents: &[u8], mode: u32) -> io::Result<()>;

    /// Append to a regular file, creating it with mode 0644 when missing
    fn append(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Create or replace a regular file with the contents of `reader`
    fn write_from(&self, path: &Path, reader: &mut dyn Read, mode: u32) -> io::Result<u64>;

    /// Create `link` pointing at `target`; `target` is stored verbatim
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    fn hard_link(&self, original: &Path, link: &Path) -> io::Result<()>;

    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// Entries of a directory, sorted by name
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// Remove a file or symlink
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Remove an empty directory
    fn remove_dir(&self, path: &Path) -> io::Result<()>;

    fn exists(&self, path: &Path) -> bool {
        self.symlink_metadata(path).is_ok()
    }

    /// The lazy installation capability, if this filesystem has one
    fn header_writer(&self) -> Option<&dyn WriteHeader> {
        None
    }
}

/// Normalize a root-relative path, rejecting anything that escapes the root
pub(crate) fn relative(path: &Path) -> io::Result<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::RootDir | Component::CurDir => {}
            Component::Normal(part) => out.push(part),
            Component::ParentDir | Component::Prefix(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("path escapes the target root: {}", path.display()),
                ));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_are_normalized() {
        assert_eq!(
            relative(Path::new("/usr/./lib/apk")).unwrap(),
            PathBuf::from("usr/lib/apk")
        );
        assert_eq!(relative(Path::new("/")).unwrap(), PathBuf::new());
        assert!(relative(Path::new("usr/../../etc")).is_err());
    }
}
