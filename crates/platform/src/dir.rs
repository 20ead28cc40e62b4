//! A target root backed by a real directory

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::{DirBuilderExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::filesystem::{relative, DirEntry, FileKind, FsMetadata, TargetFs};

/// Maps root-relative paths onto a directory on disk
#[derive(Debug, Clone)]
pub struct DirFs {
    root: PathBuf,
}

impl DirFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full(&self, path: &Path) -> io::Result<PathBuf> {
        Ok(self.root.join(relative(path)?))
    }

    /// Unlink a non-directory so a fresh entry can take its place
    fn clear(full: &Path) -> io::Result<()> {
        match fs::symlink_metadata(full) {
            Ok(meta) if !meta.is_dir() => fs::remove_file(full),
            Ok(_) | Err(_) => Ok(()),
        }
    }
}

fn kind_of(file_type: fs::FileType) -> FileKind {
    if file_type.is_dir() {
        FileKind::Directory
    } else if file_type.is_symlink() {
        FileKind::Symlink
    } else {
        FileKind::File
    }
}

impl TargetFs for DirFs {
    fn symlink_metadata(&self, path: &Path) -> io::Result<FsMetadata> {
        let meta = fs::symlink_metadata(self.full(path)?)?;
        Ok(FsMetadata {
            kind: kind_of(meta.file_type()),
            mode: meta.mode() & 0o7777,
            size: meta.len(),
        })
    }

    fn create_dir(&self, path: &Path, mode: u32) -> io::Result<()> {
        fs::DirBuilder::new().mode(mode).create(self.full(path)?)
    }

    fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        fs::DirBuilder::new()
            .mode(mode)
            .recursive(true)
            .create(self.full(path)?)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(self.full(path)?)
    }

    fn write(&self, path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
        self.write_from(path, &mut &contents[..], mode).map(|_| ())
    }

    fn append(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .mode(0o644)
            .open(self.full(path)?)?;
        file.write_all(contents)
    }

    fn write_from(&self, path: &Path, reader: &mut dyn Read, mode: u32) -> io::Result<u64> {
        let full = self.full(path)?;
        Self::clear(&full)?;
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(mode)
            .open(&full)?;
        let written = io::copy(reader, &mut file)?;
        // The umask applies at creation, so set the exact mode afterwards
        file.set_permissions(fs::Permissions::from_mode(mode))?;
        Ok(written)
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        let full = self.full(link)?;
        Self::clear(&full)?;
        std::os::unix::fs::symlink(target, full)
    }

    fn hard_link(&self, original: &Path, link: &Path) -> io::Result<()> {
        let full = self.full(link)?;
        Self::clear(&full)?;
        fs::hard_link(self.full(original)?, full)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        fs::read_link(self.full(path)?)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = fs::read_dir(self.full(path)?)?
            .map(|entry| {
                let entry = entry?;
                Ok(DirEntry {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    kind: kind_of(entry.file_type()?),
                })
            })
            .collect::<io::Result<Vec<_>>>()?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(self.full(path)?)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(self.full(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_stay_under_root() {
        let dir = TempDir::new().unwrap();
        let fs = DirFs::new(dir.path());

        fs.create_dir_all(Path::new("/usr/lib/apk/db"), 0o755).unwrap();
        fs.write(Path::new("usr/lib/apk/db/installed"), b"C:Q1\n", 0o644)
            .unwrap();
        fs.append(Path::new("usr/lib/apk/db/installed"), b"P:zlib\n")
            .unwrap();

        let on_disk = std::fs::read(dir.path().join("usr/lib/apk/db/installed")).unwrap();
        assert_eq!(on_disk, b"C:Q1\nP:zlib\n");
        assert!(fs.write(Path::new("../escape"), b"", 0o644).is_err());
    }

    #[test]
    fn replacing_a_symlink_does_not_follow_it() {
        let dir = TempDir::new().unwrap();
        let fs = DirFs::new(dir.path());
        fs.write(Path::new("target"), b"original", 0o644).unwrap();
        fs.symlink(Path::new("target"), Path::new("link")).unwrap();

        fs.write(Path::new("link"), b"replacement", 0o755).unwrap();

        assert_eq!(fs.read(Path::new("target")).unwrap(), b"original");
        let meta = fs.symlink_metadata(Path::new("link")).unwrap();
        assert_eq!(meta.kind, FileKind::File);
        assert_eq!(meta.mode, 0o755);
    }

    #[test]
    fn links_and_listing() {
        let dir = TempDir::new().unwrap();
        let fs = DirFs::new(dir.path());
        fs.create_dir(Path::new("lib"), 0o755).unwrap();
        fs.symlink(Path::new("../usr/lib/apk"), Path::new("lib/apk"))
            .unwrap();
        fs.write(Path::new("lib/a"), b"a", 0o644).unwrap();
        fs.hard_link(Path::new("lib/a"), Path::new("lib/b")).unwrap();

        assert_eq!(
            fs.read_link(Path::new("lib/apk")).unwrap(),
            PathBuf::from("../usr/lib/apk")
        );
        let names: Vec<_> = fs
            .read_dir(Path::new("lib"))
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.kind))
            .collect();
        assert_eq!(
            names,
            vec![
                ("a".to_string(), FileKind::File),
                ("apk".to_string(), FileKind::Symlink),
                ("b".to_string(), FileKind::File),
            ]
        );

        fs.remove_file(Path::new("lib/apk")).unwrap();
        assert!(!fs.exists(Path::new("lib/apk")));
    }
}
